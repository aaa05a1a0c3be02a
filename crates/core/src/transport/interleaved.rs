//! TCP-interleaved transport (RFC 2326 §10.12, spec §4.8 point 2): RTP
//! and RTCP share the RTSP TCP socket, each packet prefixed by `'$',
//! channel, htons(len)`. One [`InterleavedDemux`] lives per RTSP
//! connection and fans incoming interleaved frames out to per-channel
//! queues that [`InterleavedChannel::read_some`] drains.

use std::collections::HashMap;
use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, StreamdError, TransportError};

use super::Channel;

/// Shared per-connection demultiplexer: the connection's read loop
/// pushes frames in (spec §4.9 "`$` -> interleaved frame -> dispatch to
/// the appropriate channel buffer"), and each [`InterleavedChannel`]
/// pulls its own.
pub struct InterleavedDemux {
    inner: Mutex<DemuxInner>,
    cond: Condvar,
}

struct DemuxInner {
    queues: HashMap<u8, std::collections::VecDeque<Vec<u8>>>,
    closed: bool,
}

impl InterleavedDemux {
    pub fn new() -> Arc<Self> {
        Arc::new(InterleavedDemux {
            inner: Mutex::new(DemuxInner {
                queues: HashMap::new(),
                closed: false,
            }),
            cond: Condvar::new(),
        })
    }

    /// Called by the connection's read loop on seeing a `$` frame.
    pub fn dispatch(&self, channel_id: u8, payload: Vec<u8>) {
        let mut inner = self.inner.lock();
        inner.queues.entry(channel_id).or_default().push_back(payload);
        self.cond.notify_all();
    }

    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.cond.notify_all();
    }

    fn pop(&self, channel_id: u8, timeout: Duration) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(q) = inner.queues.get_mut(&channel_id) {
                if let Some(payload) = q.pop_front() {
                    return Ok(payload);
                }
            }
            if inner.closed {
                return Err(StreamdError::Transport(TransportError::Hard(
                    "connection closed".into(),
                )));
            }
            let result = self.cond.wait_for(&mut inner, timeout);
            if result.timed_out() {
                return Err(StreamdError::Transport(TransportError::Timeout));
            }
        }
    }
}

/// One interleaved channel id bound to the connection's shared socket
/// (write side) and demux (read side).
pub struct InterleavedChannel {
    socket: Arc<Mutex<TcpStream>>,
    demux: Arc<InterleavedDemux>,
    channel_id: u8,
    read_timeout: Duration,
}

impl InterleavedChannel {
    pub fn new(
        socket: Arc<Mutex<TcpStream>>,
        demux: Arc<InterleavedDemux>,
        channel_id: u8,
        read_timeout: Duration,
    ) -> Self {
        InterleavedChannel {
            socket,
            demux,
            channel_id,
            read_timeout,
        }
    }

    fn write_framed(&mut self, data: &[u8]) -> Result<usize> {
        if data.len() > u16::MAX as usize {
            return Err(StreamdError::Transport(TransportError::Hard(
                "interleaved frame too large".into(),
            )));
        }
        let mut framed = Vec::with_capacity(4 + data.len());
        framed.push(b'$');
        framed.push(self.channel_id);
        framed.extend_from_slice(&(data.len() as u16).to_be_bytes());
        framed.extend_from_slice(data);

        let mut socket = self.socket.lock();
        socket.write_all(&framed).map_err(map_io)?;
        Ok(data.len())
    }
}

impl Channel for InterleavedChannel {
    fn write_some(&mut self, data: &[u8]) -> Result<usize> {
        self.write_framed(data)
    }

    fn write_last(&mut self, data: &[u8]) -> Result<usize> {
        self.write_framed(data)
    }

    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let payload = self.demux.pop(self.channel_id, self.read_timeout)?;
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        Ok(n)
    }

    fn description(&self) -> String {
        format!("interleaved://channel={}", self.channel_id)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_then_pop_returns_same_payload() {
        let demux = InterleavedDemux::new();
        demux.dispatch(0, vec![1, 2, 3]);
        let payload = demux.pop(0, Duration::from_millis(50)).unwrap();
        assert_eq!(payload, vec![1, 2, 3]);
    }

    #[test]
    fn pop_times_out_when_empty() {
        let demux = InterleavedDemux::new();
        let err = demux.pop(0, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(
            err,
            StreamdError::Transport(TransportError::Timeout)
        ));
    }

    #[test]
    fn pop_after_close_is_hard_error() {
        let demux = InterleavedDemux::new();
        demux.close();
        let err = demux.pop(0, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, StreamdError::Transport(TransportError::Hard(_))));
    }
}
