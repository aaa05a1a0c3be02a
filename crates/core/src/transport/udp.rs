//! Owned UDP channel and the server-wide port pool (spec §4.8 point 1,
//! §4.8 "Port allocation").
//!
//! RTP/RTCP are allocated as an even/odd pair from a configurable
//! `[FIRST, LAST]` range; the pool tracks used ports with a simple
//! bitset-backed free list and returns both on channel drop, mirroring
//! the teacher's `session/mod.rs` monotonic counter but replacing it
//! with real recycling (spec §8 testable property 9: "ports are
//! returned to the pool on teardown").

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, StreamdError, TransportError};

use super::Channel;

/// Tracks which even ports in `[first, last]` are currently leased. Each
/// lease reserves `port` for RTP and `port + 1` for RTCP.
pub struct UdpPortPool {
    inner: Mutex<PoolState>,
}

struct PoolState {
    first: u16,
    last: u16,
    next_hint: u16,
    in_use: std::collections::HashSet<u16>,
}

impl UdpPortPool {
    pub fn new(first: u16, last: u16) -> Arc<Self> {
        let first = first + (first % 2); // round up to even
        Arc::new(UdpPortPool {
            inner: Mutex::new(PoolState {
                first,
                last,
                next_hint: first,
                in_use: std::collections::HashSet::new(),
            }),
        })
    }

    /// Lease an even RTP port; the paired RTCP port is `rtp_port + 1`.
    pub fn lease(self: &Arc<Self>) -> Result<UdpPortLease> {
        let mut state = self.inner.lock();
        if state.last < state.first + 1 {
            return Err(StreamdError::PortRangeExhausted);
        }
        let range = state.first..=(state.last - 1);
        let start = state.next_hint.max(state.first);
        let mut candidate = start;
        let mut scanned = 0u32;
        let span = (state.last - state.first) as u32 / 2 + 1;

        loop {
            if !range.contains(&candidate) {
                candidate = state.first;
            }
            if !state.in_use.contains(&candidate) && !state.in_use.contains(&(candidate + 1)) {
                state.in_use.insert(candidate);
                state.in_use.insert(candidate + 1);
                state.next_hint = candidate.saturating_add(2);
                return Ok(UdpPortLease {
                    pool: self.clone(),
                    rtp_port: candidate,
                });
            }
            candidate = candidate.saturating_add(2);
            scanned += 1;
            if scanned > span {
                return Err(StreamdError::PortRangeExhausted);
            }
        }
    }

    fn release(&self, rtp_port: u16) {
        let mut state = self.inner.lock();
        state.in_use.remove(&rtp_port);
        state.in_use.remove(&(rtp_port + 1));
    }
}

/// An RTP/RTCP port pair leased from [`UdpPortPool`]; returns both ports
/// to the pool on drop.
pub struct UdpPortLease {
    pool: Arc<UdpPortPool>,
    pub rtp_port: u16,
}

impl UdpPortLease {
    pub fn rtcp_port(&self) -> u16 {
        self.rtp_port + 1
    }
}

impl Drop for UdpPortLease {
    fn drop(&mut self) {
        self.pool.release(self.rtp_port);
    }
}

/// One half (RTP or RTCP) of a UDP transport pair, connected to a
/// single peer address (spec §4.8 "Owned UDP").
pub struct UdpChannel {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpChannel {
    pub fn bind(local_port: u16, peer: SocketAddr, write_timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", local_port))?;
        socket.connect(peer)?;
        socket.set_write_timeout(Some(write_timeout))?;
        socket.set_read_timeout(Some(write_timeout))?;
        Ok(UdpChannel { socket, peer })
    }

    /// Duplicate the underlying socket so the RTCP sender and receiver
    /// can each own an independent `Channel` over the same bound port
    /// (spec §4.7 "sender and receiver" share one socket pair).
    pub fn try_clone(&self) -> Result<Self> {
        Ok(UdpChannel {
            socket: self.socket.try_clone()?,
            peer: self.peer,
        })
    }
}

impl Channel for UdpChannel {
    fn write_some(&mut self, data: &[u8]) -> Result<usize> {
        self.socket.send(data).map_err(|e| map_io(e))
    }

    /// A datagram is atomic: the last write is the same as any other.
    fn write_last(&mut self, data: &[u8]) -> Result<usize> {
        self.write_some(data)
    }

    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.socket.recv(buf).map_err(|e| map_io(e))
    }

    fn description(&self) -> String {
        format!("udp://{}", self.peer)
    }

    fn close(&mut self) {}
}

fn map_io(e: std::io::Error) -> StreamdError {
    match e.kind() {
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
            StreamdError::Transport(TransportError::Timeout)
        }
        _ => StreamdError::Transport(TransportError::Hard(e.to_string())),
    }
}
