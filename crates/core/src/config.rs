//! Configuration (spec §6 "Configuration (key -> effect)").
//!
//! Loaded from an INI file via the `ini` crate. Section/key names match
//! the wire table in spec.md verbatim; every field has the default named
//! in spec.md §4.5/§4.7/§4.8 when the key is absent.

use std::path::Path;

use crate::error::Result;

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// `RTP.buf-empty` — pre-buffer low-water mark, seconds.
    pub buf_empty: f64,
    /// `RTP.buf-full` — pre-buffer high-water mark, seconds.
    pub buf_full: f64,
    /// `RTP.net-mtu` — packet MTU, bytes.
    pub net_mtu: usize,
    /// `RTP.udp-first` — first port of the UDP pool range.
    pub udp_first: u16,
    /// `RTP.udp-last` — last port of the UDP pool range.
    pub udp_last: u16,

    /// `SDP.base-dir` — media root directory.
    pub sdp_base_dir: String,
    /// `SDP.aggregate` — aggregate control URL.
    pub sdp_aggregate: bool,
    /// `SDP.share-descriptors` — process-wide descriptor cache.
    pub sdp_share_descriptors: bool,

    /// `RTSP.supp-seek` — allow PLAY with non-zero `from`.
    pub rtsp_supp_seek: bool,

    /// `RTCP.send-every` — SR interval, seconds.
    pub rtcp_send_every: f64,
    /// `RTCP.poll-every` — RR poll interval, seconds.
    pub rtcp_poll_every: f64,

    /// `SERVER.port`
    pub server_port: u16,
    /// `SERVER.ip`
    pub server_ip: String,
    /// `SERVER.limit` — connection cap.
    pub server_limit: usize,
    /// `SERVER.read-to` — socket read timeout, seconds.
    pub server_read_timeout: f64,
    /// `SERVER.write-to` — socket write timeout, seconds.
    pub server_write_timeout: f64,
    /// `SERVER.write-buf` — write buffer size, bytes.
    pub server_write_buf: usize,

    /// `DAEMON.pidfile`
    pub daemon_pidfile: Option<String>,

    /// Scale beyond which audio is suppressed entirely (spec §4.5).
    pub scale_limit: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            buf_empty: 1.0,
            buf_full: 3.0,
            net_mtu: 1400,
            udp_first: 5000,
            udp_last: 65000,
            sdp_base_dir: ".".to_string(),
            sdp_aggregate: true,
            sdp_share_descriptors: false,
            rtsp_supp_seek: true,
            rtcp_send_every: 5.0,
            rtcp_poll_every: 5.0,
            server_port: 8554,
            server_ip: "0.0.0.0".to_string(),
            server_limit: 256,
            server_read_timeout: 0.1,
            server_write_timeout: 1.0,
            server_write_buf: 65536,
            daemon_pidfile: None,
            scale_limit: 1.0,
        }
    }
}

impl Config {
    /// Parse an INI file at `path`, falling back to [`Config::default`]
    /// for any key that is absent or unparsable.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let ini = ini::Ini::load_from_file(path.as_ref())
            .map_err(|e| crate::error::StreamdError::Protocol(format!("INI parse error: {e}")))?;
        let mut cfg = Config::default();

        let get = |section: &str, key: &str| -> Option<String> {
            ini.section(Some(section))
                .and_then(|s| s.get(key))
                .map(|v| v.to_string())
        };
        let as_f64 = |v: Option<String>, default: f64| v.and_then(|s| s.parse().ok()).unwrap_or(default);
        let as_usize = |v: Option<String>, default: usize| v.and_then(|s| s.parse().ok()).unwrap_or(default);
        let as_u16 = |v: Option<String>, default: u16| v.and_then(|s| s.parse().ok()).unwrap_or(default);
        let as_bool = |v: Option<String>, default: bool| {
            v.and_then(|s| match s.trim() {
                "1" => Some(true),
                "0" => Some(false),
                _ => None,
            })
            .unwrap_or(default)
        };

        cfg.buf_empty = as_f64(get("RTP", "buf-empty"), cfg.buf_empty);
        cfg.buf_full = as_f64(get("RTP", "buf-full"), cfg.buf_full);
        cfg.net_mtu = as_usize(get("RTP", "net-mtu"), cfg.net_mtu);
        cfg.udp_first = as_u16(get("RTP", "udp-first"), cfg.udp_first);
        cfg.udp_last = as_u16(get("RTP", "udp-last"), cfg.udp_last);

        if let Some(v) = get("SDP", "base-dir") {
            cfg.sdp_base_dir = v;
        }
        cfg.sdp_aggregate = as_bool(get("SDP", "aggregate"), cfg.sdp_aggregate);
        cfg.sdp_share_descriptors = as_bool(get("SDP", "share-descriptors"), cfg.sdp_share_descriptors);

        cfg.rtsp_supp_seek = as_bool(get("RTSP", "supp-seek"), cfg.rtsp_supp_seek);

        cfg.rtcp_send_every = as_f64(get("RTCP", "send-every"), cfg.rtcp_send_every);
        cfg.rtcp_poll_every = as_f64(get("RTCP", "poll-every"), cfg.rtcp_poll_every);

        cfg.server_port = as_u16(get("SERVER", "port"), cfg.server_port);
        if let Some(v) = get("SERVER", "ip") {
            cfg.server_ip = v;
        }
        cfg.server_limit = as_usize(get("SERVER", "limit"), cfg.server_limit);
        cfg.server_read_timeout = as_f64(get("SERVER", "read-to"), cfg.server_read_timeout);
        cfg.server_write_timeout = as_f64(get("SERVER", "write-to"), cfg.server_write_timeout);
        cfg.server_write_buf = as_usize(get("SERVER", "write-buf"), cfg.server_write_buf);

        cfg.daemon_pidfile = get("DAEMON", "pidfile");

        tracing::info!(port = cfg.server_port, ip = %cfg.server_ip, "configuration loaded");
        Ok(cfg)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_ip, self.server_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.rtcp_send_every, 5.0);
        assert_eq!(cfg.rtcp_poll_every, 5.0);
        assert_eq!(cfg.scale_limit, 1.0);
    }

    #[test]
    fn load_overrides_from_file() {
        let path = write_tempfile_ini(
            "[SERVER]\nport=9554\nip=127.0.0.1\n\n[RTP]\nbuf-full=6.0\n",
        );
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.server_port, 9554);
        assert_eq!(cfg.server_ip, "127.0.0.1");
        assert_eq!(cfg.buf_full, 6.0);
        // Unset keys keep their defaults.
        assert_eq!(cfg.buf_empty, 1.0);
        std::fs::remove_file(path).ok();
    }

    // Minimal tempfile helper so the test doesn't need an extra dev-dependency.
    fn write_tempfile_ini(contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "streamd-test-{:?}-{}.ini",
            std::thread::current().id(),
            contents.len()
        ));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }
}
