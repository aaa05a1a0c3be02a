//! High-level server orchestrator (spec §4.11 "Accept loop + reaper").
//!
//! Owns the listening socket, the connection count, and the background
//! reaper that prunes sessions whose client has stopped sending
//! keepalives past their negotiated timeout. Delegates connection
//! handling to [`crate::session::connection`].

use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Result, StreamdError};
use crate::runtime::Runtime;
use crate::session::{self, SessionRegistry};

/// High-level RTSP server orchestrator: accept loop, connection cap, and
/// a reaper thread, all driven from one [`Runtime`].
pub struct Server {
    runtime: Runtime,
    sessions: SessionRegistry,
    running: Arc<AtomicBool>,
    active_connections: Arc<AtomicUsize>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Server {
            runtime: Runtime::new(config),
            sessions: SessionRegistry::new(),
            running: Arc::new(AtomicBool::new(false)),
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bind the listening socket and spawn the accept + reaper threads.
    /// Returns once the listener is bound; connection handling continues
    /// on background threads until [`Server::stop`] is called.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(StreamdError::Protocol("server already running".into()));
        }

        let bind_addr = self.runtime.config.bind_addr();
        let listener = TcpListener::bind(&bind_addr)?;
        listener.set_nonblocking(true)?;

        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let runtime = self.runtime.clone();
        let sessions = self.sessions.clone();
        let active_connections = self.active_connections.clone();
        let limit = self.runtime.config.server_limit;

        tracing::info!(addr = %bind_addr, limit, "RTSP server listening");

        thread::spawn(move || {
            accept_loop(listener, runtime, sessions, active_connections, limit, running);
        });

        let reaper_running = self.running.clone();
        let reaper_sessions = self.sessions.clone();
        thread::spawn(move || reap_loop(reaper_sessions, reaper_running));

        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("server stopping");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }
}

/// Non-blocking TCP accept loop (spec §4.11). Polls `running` every 50ms
/// so [`Server::stop`] terminates it promptly; rejects new connections
/// past `limit` with an immediate close rather than queuing them.
fn accept_loop(
    listener: TcpListener,
    runtime: Runtime,
    sessions: SessionRegistry,
    active_connections: Arc<AtomicUsize>,
    limit: usize,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                if active_connections.load(Ordering::SeqCst) >= limit {
                    tracing::warn!(%peer_addr, limit, "connection limit reached, rejecting");
                    continue;
                }
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let runtime = runtime.clone();
                let sessions = sessions.clone();
                let running = running.clone();
                let active_connections = active_connections.clone();
                active_connections.fetch_add(1, Ordering::SeqCst);
                thread::spawn(move || {
                    session::connection::handle(stream, runtime, sessions, running);
                    active_connections.fetch_sub(1, Ordering::SeqCst);
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// Background thread that tears down sessions nobody has touched within
/// their negotiated `Session:` timeout (RFC 2326 §12.37); GET_PARAMETER
/// keepalives and PLAY/PAUSE all count as activity via the session's own
/// tracks still running.
fn reap_loop(sessions: SessionRegistry, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_secs(5));
        let reaped = sessions.reap_stale();
        if reaped > 0 {
            tracing::info!(reaped, "reaped stale sessions");
        }
    }
    tracing::debug!("reaper loop exited");
}
