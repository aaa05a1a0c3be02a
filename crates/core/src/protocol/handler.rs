//! RTSP method dispatch (spec §4.9 "method dispatcher").
//!
//! One [`MethodHandler`] per connection. SETUP is the one method that
//! needs the connection's shared TCP socket and [`InterleavedDemux`]
//! (spec §4.8 point 2): every other method only touches the
//! process-wide [`Runtime`] and [`SessionRegistry`].

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;

use crate::clock::{Timeline, UserAgent};
use crate::error::StreamdError;
use crate::media::iterator::FrameIterator;
use crate::mount;
use crate::prebuffer::PreBuffer;
use crate::protocol::request::RtspRequest;
use crate::protocol::response::RtspResponse;
use crate::protocol::sdp;
use crate::rtcp::{RtcpReceiver, RtcpSender, SessionStats};
use crate::rtp_session::{RtpSession, SessionState};
use crate::runtime::Runtime;
use crate::session::transport::RequestedTransport;
use crate::session::{RtspSession, SessionRegistry};
use crate::transport::interleaved::InterleavedDemux;
use crate::transport::{Channel, InterleavedChannel, UdpChannel};

/// Handles RTSP method requests for a single TCP connection (spec §4.9).
///
/// Tracks which sessions were created on this connection so they can be
/// torn down when the connection drops.
pub struct MethodHandler {
    runtime: Runtime,
    sessions: SessionRegistry,
    client_addr: SocketAddr,
    socket: Arc<Mutex<TcpStream>>,
    demux: Arc<InterleavedDemux>,
    owned_session_ids: Vec<String>,
}

impl MethodHandler {
    pub fn new(
        runtime: Runtime,
        sessions: SessionRegistry,
        client_addr: SocketAddr,
        socket: Arc<Mutex<TcpStream>>,
        demux: Arc<InterleavedDemux>,
    ) -> Self {
        MethodHandler {
            runtime,
            sessions,
            client_addr,
            socket,
            demux,
            owned_session_ids: Vec::new(),
        }
    }

    /// Session IDs owned by this connection, for cleanup on disconnect
    /// (spec §4.9 "closing a connection tears down every session it
    /// owns").
    pub fn owned_session_ids(&self) -> &[String] {
        &self.owned_session_ids
    }

    pub fn handle(&mut self, request: &RtspRequest) -> RtspResponse {
        let cseq = request.cseq().unwrap_or("0").to_string();

        if let Some(session) = self.extract_session_id(request).and_then(|id| self.sessions.get(&id)) {
            session.touch();
        }

        match request.method.as_str() {
            "OPTIONS" => self.handle_options(&cseq),
            "DESCRIBE" => self.handle_describe(&cseq, &request.uri),
            "SETUP" => self.handle_setup(&cseq, request),
            "PLAY" => self.handle_play(&cseq, request),
            "PAUSE" => self.handle_pause(&cseq, request),
            "TEARDOWN" => self.handle_teardown(&cseq, request),
            "GET_PARAMETER" => self.handle_get_parameter(&cseq, request),
            "SET_PARAMETER" => self.handle_set_parameter(&cseq, request),
            _ => {
                tracing::warn!(method = %request.method, %cseq, "unsupported RTSP method");
                RtspResponse::new(501, "Not Implemented").add_header("CSeq", &cseq)
            }
        }
    }

    fn handle_options(&self, cseq: &str) -> RtspResponse {
        tracing::debug!(%cseq, "OPTIONS");
        RtspResponse::ok().add_header("CSeq", cseq).add_header(
            "Public",
            "OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN, GET_PARAMETER, SET_PARAMETER",
        )
    }

    /// Host advertised in SDP `o=`/`c=` lines; falls back to the client's
    /// own address when the URI carries none (spec §6).
    fn host_from_uri_or_client(&self, uri: &str) -> String {
        if let Some(after_scheme) = uri
            .strip_prefix("rtsp://")
            .or_else(|| uri.strip_prefix("rtsps://"))
        {
            let host = after_scheme
                .split('/')
                .next()
                .and_then(|host_port| host_port.split(':').next())
                .unwrap_or("")
                .trim();
            if !host.is_empty() {
                return host.to_string();
            }
        }
        self.client_addr.ip().to_string()
    }

    fn handle_describe(&self, cseq: &str, uri: &str) -> RtspResponse {
        tracing::debug!(%cseq, uri, "DESCRIBE");

        let mount_path = mount::extract_mount_path(uri);
        let presentation = match self.runtime.resolve_presentation(mount_path) {
            Ok(p) => p,
            Err(e) => return self.error_response(cseq, e),
        };

        let host = self.host_from_uri_or_client(uri);
        let session_id = rand::rng().random::<u32>().to_string();
        let sdp = sdp::generate_sdp(&presentation, &host, &session_id, "1", "-", &presentation.file_name, uri);

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Content-Type", "application/sdp")
            .add_header("Content-Base", uri)
            .with_body(sdp)
    }

    fn handle_setup(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let mount_path = mount::extract_mount_path(&request.uri);
        let track_index = mount::extract_track_index(&request.uri).unwrap_or(0);

        let presentation = match self.runtime.resolve_presentation(mount_path) {
            Ok(p) => p,
            Err(e) => return self.error_response(cseq, e),
        };
        let medium = match presentation.track(track_index) {
            Some(m) => m.clone(),
            None => {
                return self.error_response(
                    cseq,
                    StreamdError::NotFound(format!("track {track_index}")),
                );
            }
        };

        let transport_header = match request.get_header("Transport") {
            Some(t) => t,
            None => {
                tracing::warn!(%cseq, "SETUP missing Transport header");
                return RtspResponse::bad_request().add_header("CSeq", cseq);
            }
        };
        if transport_header.contains("multicast") {
            return self.error_response(
                cseq,
                StreamdError::UnsupportedTransport("multicast".into()),
            );
        }
        let requested = match RequestedTransport::parse(transport_header) {
            Some(t) => t,
            None => {
                tracing::warn!(%cseq, transport_header, "SETUP invalid Transport header");
                return RtspResponse::bad_request().add_header("CSeq", cseq);
            }
        };

        let (session, is_new_session) = match request.session_id().and_then(|id| self.sessions.get(id)) {
            Some(existing) => (existing, false),
            None => {
                let agent = UserAgent::detect(request.get_header("User-Agent"));
                (RtspSession::new(&request.uri, presentation.clone(), agent), true)
            }
        };

        let ssrc = rand::rng().random::<u32>();
        let stats = Arc::new(SessionStats::default());
        let cname = format!("{}@{}", presentation.file_name, self.client_addr.ip());
        let timeline = Arc::new(Mutex::new(Timeline::new(session.agent)));

        let iterator = FrameIterator::default_over(medium.clone());
        let pre_buffer = PreBuffer::new(
            iterator,
            medium.media_kind,
            medium.codec,
            medium.payload_type,
            ssrc,
            medium.clock_rate,
            self.runtime.config.net_mtu,
            self.runtime.config.buf_empty,
            self.runtime.config.buf_full,
            self.runtime.config.scale_limit,
        );
        pre_buffer.spawn_fetch();

        let write_timeout = Duration::from_secs_f64(self.runtime.config.server_write_timeout);
        let sr_interval = Duration::from_secs_f64(self.runtime.config.rtcp_send_every);
        let rr_interval = Duration::from_secs_f64(self.runtime.config.rtcp_poll_every);

        let (rtp_channel, rtcp_sender, rtcp_receiver, udp_lease, transport_response) = match requested {
            RequestedTransport::Udp { client_rtp_port, client_rtcp_port } => {
                let lease = match self.runtime.udp_pool.lease() {
                    Ok(l) => l,
                    Err(e) => return self.error_response(cseq, e),
                };
                let rtp_peer = SocketAddr::new(self.client_addr.ip(), client_rtp_port);
                let rtcp_peer = SocketAddr::new(self.client_addr.ip(), client_rtcp_port);

                let rtp_channel = match UdpChannel::bind(lease.rtp_port, rtp_peer, write_timeout) {
                    Ok(c) => c,
                    Err(e) => return self.error_response(cseq, e),
                };
                let rtcp_channel = match UdpChannel::bind(lease.rtcp_port(), rtcp_peer, write_timeout) {
                    Ok(c) => c,
                    Err(e) => return self.error_response(cseq, e),
                };
                let rtcp_recv_channel = match rtcp_channel.try_clone() {
                    Ok(c) => c,
                    Err(e) => return self.error_response(cseq, e),
                };

                let sender = RtcpSender::new(
                    Box::new(rtcp_channel),
                    timeline.clone(),
                    stats.clone(),
                    ssrc,
                    cname,
                    medium.clock_rate,
                    sr_interval,
                );
                sender.pause_sending();
                sender.spawn();
                let receiver = RtcpReceiver::new(Box::new(rtcp_recv_channel), stats.clone(), rr_interval);
                receiver.spawn();

                let transport_response = format!(
                    "RTP/AVP;unicast;client_port={client_rtp_port}-{client_rtcp_port};server_port={}-{};ssrc={ssrc:08x}",
                    lease.rtp_port,
                    lease.rtcp_port()
                );
                (Box::new(rtp_channel) as Box<dyn Channel>, sender, receiver, Some(lease), transport_response)
            }
            RequestedTransport::Interleaved { rtp_channel: rtp_id, rtcp_channel: rtcp_id } => {
                let read_timeout = Duration::from_secs_f64(self.runtime.config.server_read_timeout);
                let rtp_channel = InterleavedChannel::new(self.socket.clone(), self.demux.clone(), rtp_id, read_timeout);
                let rtcp_send_channel =
                    InterleavedChannel::new(self.socket.clone(), self.demux.clone(), rtcp_id, read_timeout);
                let rtcp_recv_channel =
                    InterleavedChannel::new(self.socket.clone(), self.demux.clone(), rtcp_id, read_timeout);

                let sender = RtcpSender::new(
                    Box::new(rtcp_send_channel),
                    timeline.clone(),
                    stats.clone(),
                    ssrc,
                    cname,
                    medium.clock_rate,
                    sr_interval,
                );
                sender.pause_sending();
                sender.spawn();
                let receiver = RtcpReceiver::new(Box::new(rtcp_recv_channel), stats.clone(), rr_interval);
                receiver.spawn();

                let transport_response = format!("RTP/AVP/TCP;interleaved={rtp_id}-{rtcp_id};ssrc={ssrc:08x}");
                (Box::new(rtp_channel) as Box<dyn Channel>, sender, receiver, None, transport_response)
            }
        };

        let rtp_session = RtpSession::new(
            pre_buffer,
            timeline,
            rtp_channel,
            medium.clock_rate,
            Some(rtcp_sender),
            Some(rtcp_receiver),
            stats,
            udp_lease,
        );
        session.insert_track(track_index, rtp_session);

        if is_new_session {
            self.sessions.insert(session.clone());
            self.owned_session_ids.push(session.id.clone());
        }

        tracing::info!(
            session_id = %session.id,
            mount_path,
            track_index,
            transport = %transport_response,
            "track set up"
        );

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Transport", &transport_response)
            .add_header("Session", &session.session_header_value())
    }

    fn handle_play(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let session = match self.lookup_session(cseq, request) {
            Ok(s) => s,
            Err(resp) => return resp,
        };

        // `PLAY` with no `Range` on an already-paused track resumes from
        // where it froze rather than restarting at zero (spec §4.10
        // "PLAY while paused resumes").
        let already_paused = session.track(0).map(|t| t.state() == SessionState::Paused).unwrap_or(false);
        let scale = request.scale();
        match request.range() {
            Some((from, to)) => session.play(from, scale, to),
            None if already_paused => session.unpause(),
            None if scale < 0.0 => {
                // Reverse with no `Range`: start from the presentation's
                // end and count down rather than hitting `OutOfBounds`
                // immediately at time zero (spec §9 "reverse-with-no-from").
                let duration = session
                    .presentation
                    .media
                    .iter()
                    .map(|m| m.duration().as_secs_f64())
                    .fold(0.0_f64, f64::max);
                session.play(duration, scale, None)
            }
            None => session.play(0.0, scale, None),
        }

        tracing::info!(session_id = %session.id, "PLAY");
        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Session", &session.session_header_value())
            .add_header("Range", "npt=0.000-")
    }

    fn handle_pause(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let session = match self.lookup_session(cseq, request) {
            Ok(s) => s,
            Err(resp) => return resp,
        };
        session.pause();
        tracing::info!(session_id = %session.id, "PAUSE");
        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Session", &session.session_header_value())
    }

    /// `remove_session(track)` (spec §4.10): a TEARDOWN naming one track's
    /// URL (`.../trackN`) drops only that `RtpSession`; the aggregate
    /// `RtspSession` (and its registry entry) is removed once every track
    /// is gone. A TEARDOWN against the aggregate URL (no track suffix)
    /// tears every track down at once, as before.
    fn handle_teardown(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let session_id = match self.extract_session_id(request) {
            Some(id) => id,
            None => {
                tracing::warn!(%cseq, "TEARDOWN missing Session header");
                return self.error_response(cseq, StreamdError::session_not_found("<missing>"));
            }
        };

        let session = match self.sessions.get(&session_id) {
            Some(s) => s,
            None => return self.error_response(cseq, StreamdError::session_not_found(session_id.as_str())),
        };

        let empty = match mount::extract_track_index(&request.uri) {
            Some(track_index) => session.remove_session(track_index),
            None => {
                session.teardown();
                true
            }
        };

        if empty {
            if self.sessions.remove(&session_id).is_ok() {
                self.owned_session_ids.retain(|id| id != &session_id);
            }
        }

        tracing::info!(session_id, "TEARDOWN");
        RtspResponse::ok().add_header("CSeq", cseq)
    }

    /// GET_PARAMETER doubles as a keepalive (RFC 2326 §10.8).
    fn handle_get_parameter(&self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        tracing::trace!(%cseq, "GET_PARAMETER keepalive");
        let mut resp = RtspResponse::ok().add_header("CSeq", cseq);
        if let Some(id) = self.extract_session_id(request) {
            if self.sessions.get(&id).is_some() {
                resp = resp.add_header("Session", &id);
            }
        }
        resp
    }

    fn handle_set_parameter(&self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        tracing::trace!(%cseq, "SET_PARAMETER");
        let mut resp = RtspResponse::ok().add_header("CSeq", cseq);
        if let Some(id) = self.extract_session_id(request) {
            if self.sessions.get(&id).is_some() {
                resp = resp.add_header("Session", &id);
            }
        }
        resp
    }

    fn lookup_session(&self, cseq: &str, request: &RtspRequest) -> std::result::Result<Arc<RtspSession>, RtspResponse> {
        let id = self.extract_session_id(request).ok_or_else(|| {
            tracing::warn!(%cseq, "request missing Session header");
            self.error_response(cseq, StreamdError::session_not_found("<missing>"))
        })?;
        self.sessions.get(&id).ok_or_else(|| {
            tracing::warn!(session_id = %id, "request for unknown session");
            self.error_response(cseq, StreamdError::session_not_found(id.as_str()))
        })
    }

    fn extract_session_id(&self, request: &RtspRequest) -> Option<String> {
        request.session_id().map(|s| s.to_string())
    }

    fn error_response(&self, cseq: &str, err: StreamdError) -> RtspResponse {
        let code = err.status_code();
        tracing::warn!(error = %err, code, "request failed");
        RtspResponse::new(code, reason_phrase(code)).add_header("CSeq", cseq)
    }
}

fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        409 => "Conflict",
        415 => "Unsupported Media Type",
        453 => "Not Enough Bandwidth",
        455 => "Method Not Valid In This State",
        461 => "Unsupported Transport",
        _ => "Internal Server Error",
    }
}
