//! RTP session / pacing loop (spec §4.6).
//!
//! One [`RtpSession`] owns one track's [`PreBuffer`], [`Timeline`], RTP
//! transport [`Channel`], and RTCP sender/receiver pair. The pacing
//! thread is the heart of the engine: fetch due frame, decide send-now
//! vs. sleep, write, repeat, under the loss-budget gate (spec §4.6
//! "Loss gate").

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::clock::Timeline;
use crate::error::{Result, StreamdError, TransportError};
use crate::prebuffer::PreBuffer;
use crate::rtcp::{RtcpReceiver, RtcpSender, SessionStats};
use crate::transport::udp::UdpPortLease;
use crate::transport::Channel;

/// `{stopped, paused, playing, seeking}` (spec §4.6): represented as a
/// small enum rather than three booleans, per the spec's own note that
/// "the three booleans in the repository collapse cleanly."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Stopped = 0,
    Paused = 1,
    Playing = 2,
    Seeking = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Stopped,
            1 => SessionState::Paused,
            2 => SessionState::Playing,
            _ => SessionState::Seeking,
        }
    }
}

/// How long the loss gate tolerates consecutive `WouldBlock` writes
/// before aborting the session (spec §4.6 "five consecutive wall-clock
/// seconds").
const LOSS_BUDGET: Duration = Duration::from_secs(5);

struct LossGate {
    first_failure: Option<Instant>,
}

impl LossGate {
    fn new() -> Self {
        LossGate { first_failure: None }
    }

    /// Returns `Err` once the budget is exceeded.
    fn record_would_block(&mut self, now: Instant) -> Result<()> {
        let start = *self.first_failure.get_or_insert(now);
        if now.duration_since(start) >= LOSS_BUDGET {
            return Err(StreamdError::Transport(TransportError::Hard(
                "loss budget exceeded".into(),
            )));
        }
        Ok(())
    }

    fn record_success(&mut self) {
        self.first_failure = None;
    }
}

struct StateBag {
    state: AtomicU8,
    mutex: Mutex<()>,
    cond: Condvar,
}

impl StateBag {
    fn new() -> Self {
        StateBag {
            state: AtomicU8::new(SessionState::Stopped as u8),
            mutex: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    fn get(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set(&self, s: SessionState) {
        self.state.store(s as u8, Ordering::SeqCst);
        let _guard = self.mutex.lock();
        self.cond.notify_all();
    }

    fn wait_while_paused(&self, timeout: Duration) {
        let mut guard = self.mutex.lock();
        while self.get() == SessionState::Paused {
            self.cond.wait_for(&mut guard, timeout);
        }
    }
}

/// One RTP/RTCP track of a presentation (spec §4.6).
pub struct RtpSession {
    pre_buffer: Arc<PreBuffer>,
    timeline: Arc<Mutex<Timeline>>,
    rtp_channel: Mutex<Box<dyn Channel>>,
    clock_rate: u32,
    state: Arc<StateBag>,
    stopped: Arc<AtomicBool>,
    sync_on_pause: Arc<(Mutex<bool>, Condvar)>,
    rtcp_sender: Option<Arc<RtcpSender>>,
    rtcp_receiver: Option<Arc<RtcpReceiver>>,
    stats: Arc<SessionStats>,
    /// `Range:`'s closed end, if any (spec §4.6 end-condition
    /// `(time_end - presentation_now) * sign(speed) <= 0`).
    time_end: Mutex<Option<f64>>,
    /// Owns the UDP port lease (if this track negotiated UDP transport)
    /// so the pair is held reserved for the session's lifetime and
    /// released back to the pool on drop (spec §8 testable property 9).
    udp_lease: Option<UdpPortLease>,
}

impl RtpSession {
    /// `timeline` is shared with the track's [`RtcpSender`] (constructed
    /// by the caller before this) so SR reports and the pacing loop agree
    /// on presentation time (spec §4.7 "reports reflect the same clock
    /// the pacer reads").
    pub fn new(
        pre_buffer: Arc<PreBuffer>,
        timeline: Arc<Mutex<Timeline>>,
        rtp_channel: Box<dyn Channel>,
        clock_rate: u32,
        rtcp_sender: Option<Arc<RtcpSender>>,
        rtcp_receiver: Option<Arc<RtcpReceiver>>,
        stats: Arc<SessionStats>,
        udp_lease: Option<UdpPortLease>,
    ) -> Arc<Self> {
        Arc::new(RtpSession {
            pre_buffer,
            timeline,
            rtp_channel: Mutex::new(rtp_channel),
            clock_rate,
            state: Arc::new(StateBag::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            sync_on_pause: Arc::new((Mutex::new(false), Condvar::new())),
            rtcp_sender,
            rtcp_receiver,
            stats,
            time_end: Mutex::new(None),
            udp_lease,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// `play(req)` (spec §4.6 `stopped|paused --play--> playing`). `to` is
    /// `Range:`'s closed end, if the request carried one.
    pub fn play(self: &Arc<Self>, from: f64, speed: f64, to: Option<f64>) {
        let now = Instant::now();
        *self.time_end.lock() = to;
        self.timeline.lock().play(from, speed, now);
        self.pre_buffer.seek(from, speed).ok();
        self.state.set(SessionState::Playing);
        if let Some(rtcp) = &self.rtcp_sender {
            rtcp.resume_sending();
        }
        let this = self.clone();
        std::thread::spawn(move || this.pacing_loop());
    }

    /// Pause request: freezes the timeline, optionally rendezvous with a
    /// waiting caller, then blocks the pacer on the unpause condition
    /// (spec §4.6 "Pause semantics").
    pub fn pause(&self, sync: bool) {
        self.timeline.lock().pause(Instant::now());
        self.state.set(SessionState::Paused);
        if let Some(rtcp) = &self.rtcp_sender {
            rtcp.pause_sending();
        }
        if sync {
            let (lock, cond) = &*self.sync_on_pause;
            *lock.lock() = true;
            cond.notify_all();
        }
    }

    /// Resumes a paused session. The pacing thread spawned by [`Self::play`]
    /// never exits on pause, it blocks in `wait_while_paused`, so this only
    /// needs to flip the state and let that wait wake up — spawning another
    /// thread here would race a second pacer against the first on the same
    /// `PreBuffer`/RTP channel (spec §4.6/§5 "exactly one pacing thread").
    pub fn unpause(self: &Arc<Self>) {
        self.timeline.lock().unpause(Instant::now());
        self.state.set(SessionState::Playing);
        if let Some(rtcp) = &self.rtcp_sender {
            rtcp.resume_sending();
        }
    }

    /// `seek(t, speed)` — transitions through `seeking` before settling
    /// back to `playing` (spec state diagram `* --seek--> seeking --
    /// (auto) --> playing`).
    pub fn seek(&self, t: f64, speed: f64) -> Result<()> {
        self.state.set(SessionState::Seeking);
        self.timeline.lock().play(t, speed, Instant::now());
        self.pre_buffer.seek(t, speed)?;
        self.state.set(SessionState::Playing);
        Ok(())
    }

    /// `insert_medium(m, at_t)` (spec §4.5 point 5) — splice `frames` into
    /// this track's live medium at `at_t`.
    pub fn insert_medium(&self, frames: &[crate::media::Frame], at_t: f64) {
        self.pre_buffer.insert_medium(frames, at_t);
    }

    /// `insert_gap(duration, at_t)` (spec §4.5 point 5).
    pub fn insert_gap(&self, duration: f64, at_t: f64) {
        self.pre_buffer.insert_gap(duration, at_t);
    }

    pub fn teardown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.state.set(SessionState::Stopped);
        self.pre_buffer.stop();
        if let Some(rtcp) = &self.rtcp_sender {
            rtcp.stop();
        }
        if let Some(rtcp) = &self.rtcp_receiver {
            rtcp.stop();
        }
    }

    fn pacing_loop(self: Arc<Self>) {
        let mut loss_gate = LossGate::new();
        loop {
            if self.stopped.load(Ordering::SeqCst) || self.state.get() == SessionState::Stopped {
                return;
            }
            self.state.wait_while_paused(Duration::from_millis(100));
            if self.stopped.load(Ordering::SeqCst) {
                return;
            }

            let descriptor = match self.pre_buffer.next_frame() {
                Ok(d) => d,
                Err(StreamdError::EndOfStream) => {
                    self.teardown();
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "pre-buffer fetch failed, retrying");
                    continue;
                }
            };

            let (now, speed) = {
                let timeline = self.timeline.lock();
                (timeline.presentation_now(), timeline.speed_now())
            };
            let sign = if speed >= 0.0 { 1.0 } else { -1.0 };

            // `Range:`'s closed end (spec §4.6 end-condition): once the
            // clock has crossed it in the direction of travel, stop
            // rather than waiting on `EndOfStream` from the iterator.
            if let Some(end) = *self.time_end.lock() {
                if (end - now) * sign <= 0.0 {
                    self.teardown();
                    return;
                }
            }

            let due = (descriptor.time - now) * sign <= 0.0;

            if !due {
                let sleep_secs = ((descriptor.time - now) / speed.abs().max(1e-6)).max(0.0);
                let sleep_dur = Duration::from_secs_f64(sleep_secs.min(5.0));
                self.state.wait_while_paused(sleep_dur);
                if self.stopped.load(Ordering::SeqCst) {
                    return;
                }
            }

            let mut sent_bytes = 0usize;
            let mut write_failed = false;
            {
                let mut channel = self.rtp_channel.lock();
                for packet in &descriptor.packets {
                    let result = if packet.is_last_of_sequence {
                        channel.write_last(&packet.bytes)
                    } else {
                        channel.write_some(&packet.bytes)
                    };
                    match result {
                        Ok(n) => sent_bytes += n,
                        Err(StreamdError::Transport(TransportError::WouldBlock))
                        | Err(StreamdError::Transport(TransportError::Timeout)) => {
                            if loss_gate.record_would_block(Instant::now()).is_err() {
                                write_failed = true;
                            }
                            break;
                        }
                        Err(_) => {
                            write_failed = true;
                            break;
                        }
                    }
                }
            }

            if write_failed {
                tracing::warn!("RTP transport failed, tearing down session");
                self.teardown();
                return;
            }
            if sent_bytes > 0 {
                loss_gate.record_success();
                self.stats.record_sent(sent_bytes);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::UserAgent;
    use crate::media::iterator::FrameIterator;
    use crate::media::packetiser::CodecId;
    use crate::media::{DemuxRecord, MediaKind, Medium, MediumSource};
    use crate::transport::ControlChannel;

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

    fn sample_session() -> Arc<RtpSession> {
        let medium = Medium::new(MediaKind::Video, CodecId::Mpeg4Video, 96, 90000, vec![], "t.mp4".into(), 0);
        medium.spawn_demux(Box::new(VecSource {
            records: vec![(0.0, true), (1.0, true)].into_iter(),
        }));
        let _ = medium.frame_count();
        let iterator = FrameIterator::default_over(medium);
        let pre_buffer = PreBuffer::new(iterator, MediaKind::Video, CodecId::Mpeg4Video, 96, 1, 90000, 1400, 1.0, 3.0, 1.0);
        let timeline = Arc::new(Mutex::new(Timeline::new(UserAgent::Generic)));
        let channel: Box<dyn Channel> = Box::new(ControlChannel::new());
        RtpSession::new(pre_buffer, timeline, channel, 90000, None, None, Arc::new(SessionStats::default()), None)
    }

    #[test]
    fn unpause_resumes_without_needing_a_new_pacer_spawn() {
        // `unpause()` used to spawn a second pacing thread here; it must
        // now be a pure state flip that lets the pacer already blocked in
        // `wait_while_paused` wake up on its own.
        let session = sample_session();
        session.pause(false);
        assert_eq!(session.state(), SessionState::Paused);
        session.unpause();
        assert_eq!(session.state(), SessionState::Playing);
    }

    #[test]
    fn play_records_time_end_from_range_close() {
        let session = sample_session();
        session.play(0.0, 1.0, Some(5.0));
        assert_eq!(*session.time_end.lock(), Some(5.0));
        session.teardown();
    }

    #[test]
    fn loss_gate_allows_transient_failures() {
        let mut gate = LossGate::new();
        let t0 = Instant::now();
        assert!(gate.record_would_block(t0).is_ok());
        assert!(gate.record_would_block(t0 + Duration::from_secs(2)).is_ok());
        gate.record_success();
        assert!(gate.record_would_block(t0 + Duration::from_secs(10)).is_ok());
    }

    #[test]
    fn loss_gate_trips_after_five_seconds() {
        let mut gate = LossGate::new();
        let t0 = Instant::now();
        gate.record_would_block(t0).unwrap();
        let result = gate.record_would_block(t0 + Duration::from_secs(6));
        assert!(result.is_err());
    }

    #[test]
    fn state_bag_round_trips() {
        let bag = StateBag::new();
        assert_eq!(bag.get(), SessionState::Stopped);
        bag.set(SessionState::Playing);
        assert_eq!(bag.get(), SessionState::Playing);
    }
}
