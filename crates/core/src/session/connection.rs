//! Per-connection RTSP read loop (spec §4.9): one thread per connection,
//! reading a byte stream that interleaves plain RTSP text requests with
//! `$`-prefixed binary RTP/RTCP frames (RFC 2326 §10.12) whenever a track
//! on this connection negotiated TCP-interleaved transport.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::protocol::handler::MethodHandler;
use crate::protocol::request::RtspRequest;
use crate::runtime::Runtime;
use crate::session::SessionRegistry;
use crate::transport::interleaved::InterleavedDemux;

/// Accept-loop entry point for one client connection (spec §4.11).
pub fn handle(stream: TcpStream, runtime: Runtime, sessions: SessionRegistry, running: Arc<AtomicBool>) {
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => addr,
        Err(_) => return,
    };
    tracing::info!(%peer_addr, "client connected");

    let mut read_half = match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    };
    let socket = Arc::new(Mutex::new(stream));
    let demux = InterleavedDemux::new();
    let mut handler = MethodHandler::new(runtime, sessions.clone(), peer_addr, socket.clone(), demux.clone());

    let reason = read_loop(&mut read_half, &socket, &demux, &mut handler, &running);
    demux.close();

    let owned = handler.owned_session_ids().to_vec();
    let removed = sessions.remove_many(&owned);
    tracing::info!(%peer_addr, reason, removed, "client disconnected");
}

/// One fully buffered frame pulled off the wire: either a text RTSP
/// request (headers + declared body) or one interleaved binary payload.
enum Frame {
    Request { head: String, body: Vec<u8> },
    Interleaved { channel: u8, payload: Vec<u8> },
}

/// Try to slice one complete [`Frame`] out of `pending`, removing its
/// bytes on success. Returns `None` if more bytes are needed.
fn take_frame(pending: &mut Vec<u8>) -> Option<Frame> {
    if pending.is_empty() {
        return None;
    }

    if pending[0] == b'$' {
        if pending.len() < 4 {
            return None;
        }
        let channel = pending[1];
        let len = u16::from_be_bytes([pending[2], pending[3]]) as usize;
        if pending.len() < 4 + len {
            return None;
        }
        let payload = pending[4..4 + len].to_vec();
        pending.drain(..4 + len);
        return Some(Frame::Interleaved { channel, payload });
    }

    let header_end = find_subslice(pending, b"\r\n\r\n").map(|i| i + 4)?;
    let head = String::from_utf8_lossy(&pending[..header_end]).into_owned();
    let content_length = parse_content_length(&head);
    if pending.len() < header_end + content_length {
        return None;
    }
    let body = pending[header_end..header_end + content_length].to_vec();
    pending.drain(..header_end + content_length);
    Some(Frame::Request { head, body })
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_content_length(head: &str) -> usize {
    head.lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("Content-Length") {
                value.trim().parse().ok()
            } else {
                None
            }
        })
        .unwrap_or(0)
}

fn read_loop(
    read_half: &mut TcpStream,
    socket: &Arc<Mutex<TcpStream>>,
    demux: &Arc<InterleavedDemux>,
    handler: &mut MethodHandler,
    running: &Arc<AtomicBool>,
) -> &'static str {
    let mut pending = Vec::new();
    let mut buf = [0u8; 8192];

    while running.load(Ordering::SeqCst) {
        while let Some(frame) = take_frame(&mut pending) {
            match frame {
                Frame::Interleaved { channel, payload } => demux.dispatch(channel, payload),
                Frame::Request { head, body } => {
                    let request = match RtspRequest::parse(&head, body) {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "RTSP parse error");
                            continue;
                        }
                    };
                    tracing::debug!(method = %request.method, uri = %request.uri, "request");
                    let response = handler.handle(&request);
                    tracing::debug!(status = response.status_code, "response");
                    let mut socket = socket.lock();
                    if socket.write_all(response.serialize().as_bytes()).is_err() {
                        return "write error";
                    }
                }
            }
        }

        match read_half.read(&mut buf) {
            Ok(0) => return "connection closed by client",
            Ok(n) => pending.extend_from_slice(&buf[..n]),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                continue;
            }
            Err(_) => return "read error",
        }
    }
    "server shutting down"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_frame_waits_for_full_interleaved_payload() {
        let mut pending = vec![b'$', 0, 0, 5, 1, 2];
        assert!(take_frame(&mut pending).is_none());
        pending.extend_from_slice(&[3, 4, 5]);
        match take_frame(&mut pending).unwrap() {
            Frame::Interleaved { channel, payload } => {
                assert_eq!(channel, 0);
                assert_eq!(payload, vec![1, 2, 3, 4, 5]);
            }
            _ => panic!("expected interleaved frame"),
        }
        assert!(pending.is_empty());
    }

    #[test]
    fn take_frame_parses_request_with_content_length() {
        let mut pending = b"OPTIONS rtsp://h/s RTSP/1.0\r\nCSeq: 1\r\nContent-Length: 3\r\n\r\nabcrest".to_vec();
        match take_frame(&mut pending).unwrap() {
            Frame::Request { head, body } => {
                assert!(head.contains("OPTIONS"));
                assert_eq!(body, b"abc");
            }
            _ => panic!("expected request frame"),
        }
        assert_eq!(pending, b"rest");
    }

    #[test]
    fn take_frame_waits_for_full_headers() {
        let mut pending = b"OPTIONS rtsp://h/s RTSP/1.0\r\nCSeq: 1\r\n".to_vec();
        assert!(take_frame(&mut pending).is_none());
    }
}
