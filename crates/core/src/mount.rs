//! Descriptor registry (spec §3 "Descriptor registry", §9 "shared vs
//! per-connection"): a process-wide, lock-guarded cache from mount path
//! to a loaded [`Presentation`] (the "Medium-container" spec §3 names).
//! `share_descriptors` toggles whether entries persist across
//! connections (ref-counted by the `Arc` itself) or are loaded fresh per
//! resolve call.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, StreamdError};
use crate::media::Medium;

pub const DEFAULT_MOUNT_PATH: &str = "/stream";

/// One loaded presentation: the set of Mediums (tracks) that make up a
/// single RTSP mount point, addressable by track index for
/// `a=control:<url>/tk=<index>`.
pub struct Presentation {
    pub file_name: String,
    pub media: Vec<Arc<Medium>>,
}

impl Presentation {
    pub fn new(file_name: impl Into<String>, media: Vec<Arc<Medium>>) -> Arc<Self> {
        Arc::new(Presentation {
            file_name: file_name.into(),
            media,
        })
    }

    pub fn track(&self, index: usize) -> Option<&Arc<Medium>> {
        self.media.get(index)
    }
}

/// Registry of mount paths. Each path is bound to a loader closure that
/// builds a fresh [`Presentation`] from the file named by
/// [`Config::sdp_base_dir`](crate::config::Config); the registry decides
/// whether to cache the result.
#[derive(Clone)]
pub struct MountRegistry {
    mounts: Arc<RwLock<HashMap<String, Arc<Presentation>>>>,
    default_path: Arc<RwLock<Option<String>>>,
    share_descriptors: bool,
}

impl MountRegistry {
    pub fn new(share_descriptors: bool) -> Self {
        MountRegistry {
            mounts: Arc::new(RwLock::new(HashMap::new())),
            default_path: Arc::new(RwLock::new(None)),
            share_descriptors,
        }
    }

    /// Register or replace the presentation at `path`. In shared mode
    /// this is the cache entry every later `resolve` reuses; in
    /// per-connection mode it still seeds the registry so `resolve` has
    /// something to clone (a real deployment would instead call
    /// `resolve_with` against a loader per request, see below).
    pub fn add(&self, path: &str, presentation: Arc<Presentation>) {
        self.mounts.write().insert(path.to_string(), presentation);
        tracing::info!(path, "mount registered");
    }

    pub fn set_default(&self, path: &str) {
        *self.default_path.write() = Some(path.to_string());
    }

    pub fn get(&self, path: &str) -> Option<Arc<Presentation>> {
        self.mounts.read().get(path).cloned()
    }

    pub fn resolve_from_uri(&self, uri: &str) -> Option<Arc<Presentation>> {
        let path = extract_mount_path(uri);
        self.get(path).or_else(|| {
            let default = self.default_path.read();
            default.as_ref().and_then(|p| self.get(p))
        })
    }

    /// Resolve `path`, invoking `loader` on a cache miss. In shared mode
    /// the loaded presentation is cached for subsequent resolves; in
    /// per-connection mode the loader always runs and the result is
    /// never cached (spec §3 "membership policy is configurable").
    pub fn resolve_with(
        &self,
        path: &str,
        loader: impl FnOnce() -> Result<Arc<Presentation>>,
    ) -> Result<Arc<Presentation>> {
        if self.share_descriptors {
            if let Some(existing) = self.get(path) {
                return Ok(existing);
            }
            let loaded = loader()?;
            self.mounts.write().insert(path.to_string(), loaded.clone());
            Ok(loaded)
        } else {
            loader()
        }
    }

    pub fn remove(&self, path: &str) -> Result<()> {
        self.mounts
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StreamdError::NotFound(path.to_string()))
    }

    pub fn share_descriptors(&self) -> bool {
        self.share_descriptors
    }
}

/// Extract the mount path from an RTSP URI (grounded on the teacher's
/// original implementation; unchanged behaviour, generalised only in
/// that it now resolves a [`Presentation`] instead of a single-codec
/// `Mount`).
///
/// `rtsp://host:8554/stream/track1` → `/stream`
/// `rtsp://host:8554/stream`        → `/stream`
/// `rtsp://host:8554/`              → `/`
/// `rtsp://host:8554`               → `/stream` (default)
/// `*`                               → `/stream` (default)
pub fn extract_mount_path(uri: &str) -> &str {
    let path = if let Some(after) = uri
        .strip_prefix("rtsp://")
        .or_else(|| uri.strip_prefix("rtsps://"))
    {
        match after.find('/') {
            Some(slash) => &after[slash..],
            None => DEFAULT_MOUNT_PATH,
        }
    } else if uri.starts_with('/') {
        uri
    } else {
        DEFAULT_MOUNT_PATH
    };

    if let Some(pos) = path.rfind("/track") {
        &path[..pos]
    } else {
        path
    }
}

/// Extract the track index from an RTSP URI's `/trackN` suffix, if
/// present (spec §6 `a=control:<url>/tk=<index>`, generalised here to a
/// `/trackN` path segment to match [`crate::protocol::sdp::generate_sdp`]'s
/// own control-URL shape).
pub fn extract_track_index(uri: &str) -> Option<usize> {
    let pos = uri.rfind("/track")?;
    uri[pos + "/track".len()..].parse().ok()
}

/// Strip the leading `/` from a mount path to get the presentation name
/// used to key the on-disk manifest (spec §6 `SDP.base-dir`).
pub fn mount_path_to_name(path: &str) -> &str {
    path.trim_start_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use crate::media::packetiser::CodecId;

    fn sample_presentation() -> Arc<Presentation> {
        let medium = Medium::new(
            MediaKind::Video,
            CodecId::Mpeg4Video,
            96,
            90000,
            vec![],
            "sample.mp4".into(),
            0,
        );
        Presentation::new("sample.mp4", vec![medium])
    }

    #[test]
    fn extract_path_full_uri() {
        assert_eq!(extract_mount_path("rtsp://localhost:8554/stream"), "/stream");
    }

    #[test]
    fn extract_path_with_track() {
        assert_eq!(
            extract_mount_path("rtsp://localhost:8554/stream/track1"),
            "/stream"
        );
    }

    #[test]
    fn extract_path_no_path() {
        assert_eq!(extract_mount_path("rtsp://localhost:8554"), DEFAULT_MOUNT_PATH);
    }

    #[test]
    fn extract_path_star() {
        assert_eq!(extract_mount_path("*"), DEFAULT_MOUNT_PATH);
    }

    #[test]
    fn extract_track_index_present() {
        assert_eq!(extract_track_index("rtsp://h/stream/track1"), Some(1));
        assert_eq!(extract_track_index("rtsp://h/stream"), None);
    }

    #[test]
    fn mount_path_to_name_strips_slash() {
        assert_eq!(mount_path_to_name("/stream"), "stream");
    }

    #[test]
    fn registry_add_and_get() {
        let registry = MountRegistry::new(true);
        registry.add("/stream", sample_presentation());
        assert!(registry.get("/stream").is_some());
        assert!(registry.get("/other").is_none());
    }

    #[test]
    fn registry_resolve_fallback_to_default() {
        let registry = MountRegistry::new(true);
        registry.add("/stream", sample_presentation());
        registry.set_default("/stream");

        assert!(registry.resolve_from_uri("rtsp://localhost:8554/test").is_some());
    }

    #[test]
    fn shared_mode_caches_loader_result() {
        let registry = MountRegistry::new(true);
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let load = || {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(sample_presentation())
        };
        registry.resolve_with("/stream", load).unwrap();
        registry.resolve_with("/stream", load).unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn per_connection_mode_always_reloads() {
        let registry = MountRegistry::new(false);
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let load = || {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(sample_presentation())
        };
        registry.resolve_with("/stream", load).unwrap();
        registry.resolve_with("/stream", load).unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
