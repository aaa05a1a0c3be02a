//! RTSP session management (spec §4.10).
//!
//! An [`RtspSession`] is the server-side state object created by the
//! first SETUP on a presentation and destroyed by TEARDOWN or connection
//! cleanup. It aggregates one [`RtpSession`] per negotiated track and
//! fans PLAY/PAUSE/TEARDOWN out to all of them together, so a client
//! sees one aggregate control point over a multi-track presentation
//! (spec §4.10 "aggregate control").

pub mod connection;
pub mod transport;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::clock::UserAgent;
use crate::error::{Result, StreamdError};
use crate::media::MediaKind;
use crate::mount::Presentation;
use crate::rtp_session::{RtpSession, SessionState};

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Default session timeout in seconds (RFC 2326 §12.37).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// One RTSP session: the aggregate of every track's [`RtpSession`] set up
/// under a single `Session:` id (spec §4.10).
pub struct RtspSession {
    pub id: String,
    pub uri: String,
    pub presentation: Arc<Presentation>,
    pub agent: UserAgent,
    pub timeout_secs: u64,
    tracks: RwLock<HashMap<usize, Arc<RtpSession>>>,
    last_activity: Mutex<Instant>,
}

impl RtspSession {
    pub fn new(uri: &str, presentation: Arc<Presentation>, agent: UserAgent) -> Arc<Self> {
        let id = SESSION_COUNTER.fetch_add(1, Ordering::SeqCst);
        Arc::new(RtspSession {
            id: format!("{:08X}", id),
            uri: uri.to_string(),
            presentation,
            agent,
            timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            tracks: RwLock::new(HashMap::new()),
            last_activity: Mutex::new(Instant::now()),
        })
    }

    /// Record that the client sent a request against this session (any
    /// method carrying its `Session:` id counts, including GET_PARAMETER
    /// keepalives), resetting its RFC 2326 §12.37 timeout clock.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Whether this session has gone silent past its negotiated timeout
    /// (spec §4.11 "reaper").
    pub fn is_stale(&self) -> bool {
        self.last_activity.lock().elapsed() > Duration::from_secs(self.timeout_secs)
    }

    /// Attach the [`RtpSession`] negotiated for `track_index` (spec §4.10
    /// "SETUP adds one track to the aggregate").
    pub fn insert_track(&self, track_index: usize, rtp_session: Arc<RtpSession>) {
        self.tracks.write().insert(track_index, rtp_session);
    }

    pub fn track(&self, track_index: usize) -> Option<Arc<RtpSession>> {
        self.tracks.read().get(&track_index).cloned()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.read().len()
    }

    /// `PLAY` — start every track from `from` at `speed`, stopping at
    /// `to` if `Range:` named a closed end (spec §4.10, §4.6).
    pub fn play(&self, from: f64, speed: f64, to: Option<f64>) {
        for session in self.tracks.read().values() {
            session.play(from, speed, to);
        }
    }

    /// `PAUSE` — freeze every track.
    pub fn pause(&self) {
        for session in self.tracks.read().values() {
            session.pause(false);
        }
    }

    /// `PLAY` while already playing resumes from the frozen position.
    pub fn unpause(&self) {
        for session in self.tracks.read().values() {
            session.unpause();
        }
    }

    pub fn seek(&self, t: f64, speed: f64) -> Result<()> {
        for session in self.tracks.read().values() {
            session.seek(t, speed)?;
        }
        Ok(())
    }

    /// `TEARDOWN` — stop every track's pacing/RTCP threads and release
    /// its transport (UDP lease drop, interleaved channel just stops
    /// being read).
    pub fn teardown(&self) {
        for session in self.tracks.read().values() {
            session.teardown();
        }
        self.tracks.write().clear();
    }

    /// `insert_media(container, at_t)` (spec §4.10 point 5): pause every
    /// track, find the insertion instant by asking the video track (or
    /// the first track if none) for the first splice-safe point `>=
    /// at_t`, then for every local track splice in the incoming medium
    /// sharing its payload type, or an equal-duration gap otherwise;
    /// unpause whatever wasn't already paused. Fails if this session has
    /// no tracks to anchor against.
    pub fn insert_media(&self, container: &Presentation, at_t: f64) -> Result<()> {
        let was_paused: std::collections::HashSet<usize> = self
            .tracks
            .read()
            .iter()
            .filter(|(_, t)| t.state() == SessionState::Paused)
            .map(|(i, _)| *i)
            .collect();
        self.pause();

        let anchor = self
            .presentation
            .media
            .iter()
            .find(|m| m.media_kind == MediaKind::Video)
            .or_else(|| self.presentation.media.first())
            .ok_or_else(|| StreamdError::NotFound("presentation has no tracks to splice against".into()))?;
        let instant = anchor.frame_at(anchor.frame_pos(at_t)?)?.time;

        for (index, local_medium) in self.presentation.media.iter().enumerate() {
            let Some(track) = self.track(index) else { continue };
            match container.media.iter().find(|m| m.payload_type == local_medium.payload_type) {
                Some(incoming) => {
                    let frames = incoming.frames_in(0.0, incoming.duration().as_secs_f64());
                    track.insert_medium(&frames, instant);
                }
                None => {
                    let gap = container
                        .media
                        .iter()
                        .map(|m| m.duration().as_secs_f64())
                        .fold(0.0_f64, f64::max);
                    track.insert_gap(gap, instant);
                }
            }
        }

        for index in 0..self.presentation.media.len() {
            if was_paused.contains(&index) {
                continue;
            }
            if let Some(track) = self.track(index) {
                track.unpause();
            }
        }
        Ok(())
    }

    /// `remove_session(track)` (spec §4.10): tears down the one
    /// `RtpSession` at `track_index`. Returns `true` once no track
    /// remains, the signal the caller (the RTSP connection) uses to drop
    /// this aggregate session — and, if it was the connection's last
    /// session, to close the socket.
    pub fn remove_session(&self, track_index: usize) -> bool {
        if let Some(track) = self.tracks.write().remove(&track_index) {
            track.teardown();
        }
        self.tracks.read().is_empty()
    }

    /// Format the `Session` response header value (RFC 2326 §12.37).
    pub fn session_header_value(&self) -> String {
        format!("{};timeout={}", self.id, self.timeout_secs)
    }
}

/// Thread-safe registry of active RTSP sessions, keyed by session id.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<RtspSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn insert(&self, session: Arc<RtspSession>) {
        let total = {
            let mut sessions = self.sessions.write();
            sessions.insert(session.id.clone(), session.clone());
            sessions.len()
        };
        tracing::debug!(session_id = %session.id, total_sessions = total, "session created");
    }

    pub fn get(&self, id: &str) -> Option<Arc<RtspSession>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Result<Arc<RtspSession>> {
        self.sessions
            .write()
            .remove(id)
            .ok_or_else(|| StreamdError::session_not_found(id))
    }

    /// Remove and tear down multiple sessions at once (connection
    /// cleanup on disconnect, spec §4.9).
    pub fn remove_many(&self, ids: &[String]) -> usize {
        let mut sessions = self.sessions.write();
        let mut removed = 0;
        for id in ids {
            if let Some(session) = sessions.remove(id) {
                session.teardown();
                removed += 1;
            }
        }
        removed
    }

    /// Tear down and remove every session that has gone silent past its
    /// negotiated timeout (spec §4.11 "reaper"). Returns the count
    /// reaped.
    pub fn reap_stale(&self) -> usize {
        let stale_ids: Vec<String> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.is_stale())
            .map(|s| s.id.clone())
            .collect();
        if stale_ids.is_empty() {
            return 0;
        }
        self.remove_many(&stale_ids)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timeline;
    use crate::media::iterator::FrameIterator;
    use crate::media::packetiser::CodecId;
    use crate::media::{DemuxRecord, Medium, MediumSource};
    use crate::prebuffer::PreBuffer;
    use crate::rtcp::SessionStats;
    use crate::transport::{Channel, ControlChannel};

    struct VecSource {
        records: std::vec::IntoIter<(f64, bool)>,
    }

    impl MediumSource for VecSource {
        fn next_record(&mut self) -> Option<DemuxRecord> {
            self.records.next().map(|(pts, is_key)| DemuxRecord {
                stream_index: 0,
                pts,
                dts: pts,
                payload: vec![0u8; 4],
                is_key,
            })
        }
        fn media_kind(&self) -> MediaKind {
            MediaKind::Video
        }
        fn codec_id(&self) -> CodecId {
            CodecId::Mpeg4Video
        }
        fn payload_type(&self) -> u8 {
            96
        }
        fn clock_rate(&self) -> u32 {
            90000
        }
        fn extradata(&self) -> Vec<u8> {
            vec![]
        }
    }

    fn sample_medium(frames: &[(f64, bool)]) -> Arc<Medium> {
        let medium = Medium::new(MediaKind::Video, CodecId::Mpeg4Video, 96, 90000, vec![], "s.mp4".into(), 0);
        medium.spawn_demux(Box::new(VecSource {
            records: frames.to_vec().into_iter(),
        }));
        let _ = medium.frame_count();
        medium
    }

    fn sample_presentation() -> Arc<Presentation> {
        let medium = sample_medium(&[(0.0, true), (1.0, true), (2.0, true)]);
        Presentation::new("s.mp4", vec![medium])
    }

    /// A minimal but fully real `RtpSession` (no mocked transport): the
    /// control channel just buffers writes, so the pacing loop it spawns
    /// idles on an empty pre-buffer without sending anywhere.
    fn sample_rtp_session() -> Arc<RtpSession> {
        let medium = sample_medium(&[(0.0, true), (1.0, true)]);
        let iterator = FrameIterator::default_over(medium);
        let pre_buffer = PreBuffer::new(iterator, MediaKind::Video, CodecId::Mpeg4Video, 96, 1, 90000, 1400, 1.0, 3.0, 1.0);
        let timeline = Arc::new(Mutex::new(Timeline::new(UserAgent::Generic)));
        let channel: Box<dyn Channel> = Box::new(ControlChannel::new());
        RtpSession::new(
            pre_buffer,
            timeline,
            channel,
            90000,
            None,
            None,
            Arc::new(SessionStats::default()),
            None,
        )
    }

    #[test]
    fn registry_insert_get_remove() {
        let registry = SessionRegistry::new();
        let session = RtspSession::new("rtsp://h/s", sample_presentation(), UserAgent::Generic);
        let id = session.id.clone();
        registry.insert(session);

        assert!(registry.get(&id).is_some());
        assert!(registry.remove(&id).is_ok());
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn remove_unknown_session_errors() {
        let registry = SessionRegistry::new();
        assert!(registry.remove("nope").is_err());
    }

    #[test]
    fn session_header_value_includes_timeout() {
        let session = RtspSession::new("rtsp://h/s", sample_presentation(), UserAgent::Generic);
        assert!(session.session_header_value().ends_with(";timeout=60"));
    }

    #[test]
    fn insert_media_fails_with_no_tracks_to_anchor_against() {
        let empty = Presentation::new("empty.mp4", vec![]);
        let session = RtspSession::new("rtsp://h/s", empty, UserAgent::Generic);
        let container = sample_presentation();
        assert!(session.insert_media(&container, 0.0).is_err());
    }

    #[test]
    fn insert_media_unpauses_tracks_that_were_not_already_paused() {
        let session = RtspSession::new("rtsp://h/s", sample_presentation(), UserAgent::Generic);
        let track = sample_rtp_session();
        session.insert_track(0, track.clone());

        let container = sample_presentation();
        session.insert_media(&container, 1.0).unwrap();

        // The track started `Stopped`, so it wasn't in the paused set
        // `insert_media` freezes before splicing, and must come back
        // `Playing` once the splice is done.
        assert_eq!(track.state(), SessionState::Playing);
    }

    #[test]
    fn remove_session_signals_empty_only_once_every_track_is_gone() {
        let session = RtspSession::new("rtsp://h/s", sample_presentation(), UserAgent::Generic);
        session.insert_track(0, sample_rtp_session());
        session.insert_track(1, sample_rtp_session());

        assert!(!session.remove_session(0));
        assert_eq!(session.track_count(), 1);
        assert!(session.remove_session(1));
        assert_eq!(session.track_count(), 0);
    }

    #[test]
    fn remove_session_on_unknown_track_reports_empty_if_already_empty() {
        let session = RtspSession::new("rtsp://h/s", sample_presentation(), UserAgent::Generic);
        assert!(session.remove_session(0));
    }
}
