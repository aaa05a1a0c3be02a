//! Explicit process-wide context (spec §9 "Process-wide singletons": the
//! UDP port pool, the descriptor cache, and the server instance move
//! behind an explicit `Runtime` rather than hidden globals/statics).

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::media::loader;
use crate::mount::{self, MountRegistry, Presentation};
use crate::transport::UdpPortPool;

/// Everything a connection/session needs that is shared across the
/// whole server, constructed once at startup and cloned (cheaply, via
/// `Arc`) into every connection handler.
#[derive(Clone)]
pub struct Runtime {
    pub config: Arc<Config>,
    pub udp_pool: Arc<UdpPortPool>,
    pub mounts: Arc<MountRegistry>,
}

impl Runtime {
    pub fn new(config: Config) -> Self {
        let udp_pool = UdpPortPool::new(config.udp_first, config.udp_last);
        let mounts = MountRegistry::new(config.sdp_share_descriptors);
        Runtime {
            config: Arc::new(config),
            udp_pool,
            mounts: Arc::new(mounts),
        }
    }

    /// Resolve `mount_path` to a loaded [`Presentation`], honouring the
    /// registry's shared-vs-per-connection membership policy (spec §3
    /// "Descriptor registry").
    pub fn resolve_presentation(&self, mount_path: &str) -> Result<Arc<Presentation>> {
        let name = mount::mount_path_to_name(mount_path);
        let base_dir = self.config.sdp_base_dir.clone();
        self.mounts
            .resolve_with(mount_path, || loader::load_presentation(&base_dir, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_runtime_wires_pool_from_config() {
        let mut config = Config::default();
        config.udp_first = 7000;
        config.udp_last = 7010;
        let rt = Runtime::new(config);
        let lease = rt.udp_pool.lease().unwrap();
        assert!((7000..=7010).contains(&lease.rtp_port));
    }
}
