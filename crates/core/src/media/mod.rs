//! Medium (frame store) and the codec/RTP plumbing built on top of it.
//!
//! A [`Medium`] is a container-backed, append-only sequence of [`Frame`]s
//! (spec §3, §4.2). It is produced by a demux thread reading from a
//! [`MediumSource`] and consumed through [`iterator::FrameIterator`]
//! cursors.

pub mod codecs;
pub mod demux;
pub mod iterator;
pub mod loader;
pub mod packetiser;
pub mod rtp;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, StreamdError};
use crate::media::packetiser::CodecId;

/// Media kind; governs trick-mode policy selection in the pre-buffer and
/// the "round down to key frame" rule in several Medium operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Application,
}

/// One compressed media unit with a presentation time (spec §3 "Frame").
#[derive(Debug, Clone)]
pub struct Frame {
    /// Presentation time in seconds, monotonic within a medium (absent a
    /// deliberate splice).
    pub time: f64,
    pub payload: Vec<u8>,
    pub payload_type: u8,
    /// Only meaningful for [`MediaKind::Video`].
    pub is_key: bool,
    /// Index in the owning medium at the time it was produced.
    pub origin_pos: usize,
}

/// (stream_index, pts, dts, payload, key_flag) record emitted by a demuxer
/// collaborator (spec §4.2). `dts` is currently unused by the pacing
/// model (which paces on presentation time only) but is threaded through
/// because a real container demuxer produces it.
#[derive(Debug, Clone)]
pub struct DemuxRecord {
    pub stream_index: usize,
    pub pts: f64,
    pub dts: f64,
    pub payload: Vec<u8>,
    pub is_key: bool,
}

/// A collaborator that turns a container into a stream of [`DemuxRecord`]s.
/// Spec §1 names "on-disk container demuxing library" as an external
/// collaborator; this trait is the interface boundary, with two concrete
/// implementations (spec §9's "optional second collaborator"):
/// [`demux::ElementaryStreamSource`] for file-backed VOD, and
/// [`demux::LiveCaptureSource`] as the v4l-equivalent stand-in that never
/// terminates.
pub trait MediumSource: Send {
    /// Produce the next record, or `None` at end-of-container.
    fn next_record(&mut self) -> Option<DemuxRecord>;
    fn media_kind(&self) -> MediaKind;
    fn codec_id(&self) -> CodecId;
    fn payload_type(&self) -> u8;
    fn clock_rate(&self) -> u32;
    /// Codec-specific extradata (SPS/PPS, AudioSpecificConfig, ...),
    /// byte-exact for SDP `fmtp` (spec §3).
    fn extradata(&self) -> Vec<u8>;
}

/// Container-backed, indexed, seekable, append-friendly frame store
/// (spec §4.2). One mutex guards the frame vector and a condvar signals
/// "new frames" / "finalised".
pub struct Medium {
    inner: Mutex<MediumInner>,
    cond: Condvar,
    /// `frame_count()` blocks on this while `None`.
    finalised: AtomicBool,
    live_iterators: AtomicUsize,
    pub media_kind: MediaKind,
    pub codec: CodecId,
    pub payload_type: u8,
    pub clock_rate: u32,
    pub extradata: Vec<u8>,
    pub file_name: String,
    pub track_index: usize,
    /// Seconds; `i64::MAX` encodes "infinite" (live sources).
    duration_millis: AtomicI64,
}

struct MediumInner {
    frames: Vec<Frame>,
    final_count: Option<usize>,
}

impl Medium {
    pub fn new(
        media_kind: MediaKind,
        codec: CodecId,
        payload_type: u8,
        clock_rate: u32,
        extradata: Vec<u8>,
        file_name: String,
        track_index: usize,
    ) -> Arc<Self> {
        Arc::new(Medium {
            inner: Mutex::new(MediumInner {
                frames: Vec::new(),
                final_count: None,
            }),
            cond: Condvar::new(),
            finalised: AtomicBool::new(false),
            live_iterators: AtomicUsize::new(0),
            media_kind,
            codec,
            payload_type,
            clock_rate,
            extradata,
            file_name,
            track_index,
            duration_millis: AtomicI64::new(0),
        })
    }

    /// Run the demux thread for `source`, pushing records until EOF.
    /// Mirrors the teacher's pattern of spawning a background worker from
    /// `Server::start` and signalling via a condvar (spec §4.2, §5).
    pub fn spawn_demux(self: &Arc<Self>, mut source: Box<dyn MediumSource>) {
        let medium = self.clone();
        std::thread::spawn(move || {
            tracing::debug!(file = %medium.file_name, "demux thread started");
            debug_assert_eq!(source.codec_id(), medium.codec, "Medium/MediumSource codec mismatch");
            while let Some(record) = source.next_record() {
                let frame = Frame {
                    time: record.pts,
                    payload: record.payload,
                    payload_type: medium.payload_type,
                    is_key: record.is_key,
                    origin_pos: 0,
                };
                medium.push_frame(frame);
            }
            medium.finalise();
            tracing::debug!(file = %medium.file_name, "demux thread finished");
        });
    }

    fn push_frame(&self, mut frame: Frame) {
        let mut inner = self.inner.lock();
        frame.origin_pos = inner.frames.len();
        if let Some(last) = inner.frames.last() {
            debug_assert!(
                frame.time >= last.time,
                "frame time must be monotonic absent a splice"
            );
        }
        self.duration_millis
            .store((frame.time * 1000.0) as i64, Ordering::Relaxed);
        inner.frames.push(frame);
        self.cond.notify_all();
    }

    fn finalise(&self) {
        let mut inner = self.inner.lock();
        inner.final_count = Some(inner.frames.len());
        self.finalised.store(true, Ordering::SeqCst);
        self.cond.notify_all();
    }

    /// `frame_count()` — blocks until final if not yet known.
    pub fn frame_count(&self) -> usize {
        let mut inner = self.inner.lock();
        loop {
            if let Some(n) = inner.final_count {
                return n;
            }
            self.cond.wait(&mut inner);
        }
    }

    /// `frame_at(index)` — blocks on "not yet produced"; fails with
    /// `OutOfBounds` once the medium is finalised and `index` is beyond it.
    pub fn frame_at(&self, index: usize) -> Result<Frame> {
        let mut inner = self.inner.lock();
        loop {
            if index < inner.frames.len() {
                return Ok(inner.frames[index].clone());
            }
            if let Some(n) = inner.final_count {
                if index >= n {
                    return Err(StreamdError::OutOfBounds(format!(
                        "frame {index} past final count {n}"
                    )));
                }
            }
            self.cond.wait(&mut inner);
        }
    }

    /// `frame_pos(t)` — smallest index `i` with `frame[i].time >= t` AND
    /// (for video) `frame[i].is_key`; blocks while more frames may arrive.
    pub fn frame_pos(&self, t: f64) -> Result<usize> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(pos) = Self::search_pos(&inner.frames, t, self.media_kind) {
                return Ok(pos);
            }
            if let Some(n) = inner.final_count {
                if inner.frames.len() >= n {
                    return Err(StreamdError::OutOfBounds(format!(
                        "no frame >= {t}s in finalised medium"
                    )));
                }
            }
            self.cond.wait(&mut inner);
        }
    }

    fn search_pos(frames: &[Frame], t: f64, kind: MediaKind) -> Option<usize> {
        frames
            .iter()
            .position(|f| f.time >= t && (kind != MediaKind::Video || f.is_key))
    }

    /// `frames_in(from, to)` — cloned snapshot; for video, `to` is rounded
    /// down to the last key frame strictly before the one covering `to`.
    pub fn frames_in(&self, from: f64, to: f64) -> Vec<Frame> {
        let inner = self.inner.lock();
        let effective_to = if self.media_kind == MediaKind::Video {
            let covering = inner.frames.iter().position(|f| f.time >= to);
            match covering {
                Some(idx) => {
                    let last_key_before = inner.frames[..idx]
                        .iter()
                        .rposition(|f| f.is_key)
                        .map(|i| inner.frames[i].time)
                        .unwrap_or(from);
                    last_key_before
                }
                None => to,
            }
        } else {
            to
        };
        inner
            .frames
            .iter()
            .filter(|f| f.time >= from && f.time <= effective_to)
            .cloned()
            .collect()
    }

    /// `insert(frames, at_t)` — splices a time-displaced copy of `frames`
    /// into this medium at the first valid position >= `at_t`, shifting
    /// subsequent frames by the splice's duration, preserving strict
    /// monotonicity (spec §4.2).
    pub fn insert(&self, frames: &[Frame], at_t: f64) {
        if frames.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        let splice_at = inner
            .frames
            .iter()
            .position(|f| f.time >= at_t)
            .unwrap_or(inner.frames.len());
        let splice_duration = frames.last().unwrap().time - frames.first().unwrap().time;

        for f in &mut inner.frames[splice_at..] {
            f.time += splice_duration;
        }

        let base_time = at_t;
        let displaced: Vec<Frame> = frames
            .iter()
            .map(|f| Frame {
                time: base_time + (f.time - frames[0].time),
                ..f.clone()
            })
            .collect();

        inner.frames.splice(splice_at..splice_at, displaced);
        for (i, f) in inner.frames.iter_mut().enumerate() {
            f.origin_pos = i;
        }
        self.cond.notify_all();
    }

    /// `insert_gap(duration, at_t)` — shifts subsequent frames without
    /// adding content.
    pub fn insert_gap(&self, duration: f64, at_t: f64) {
        let mut inner = self.inner.lock();
        let splice_at = inner
            .frames
            .iter()
            .position(|f| f.time >= at_t)
            .unwrap_or(inner.frames.len());
        for f in &mut inner.frames[splice_at..] {
            f.time += duration;
        }
        self.cond.notify_all();
    }

    /// `append(frames)` — blocks until finalised, then concatenates.
    pub fn append(&self, frames: &[Frame]) {
        // Block until this medium is finalised (spec §4.2).
        {
            let mut inner = self.inner.lock();
            while inner.final_count.is_none() {
                self.cond.wait(&mut inner);
            }
        }
        let mut inner = self.inner.lock();
        let base = inner.frames.last().map(|f| f.time).unwrap_or(0.0);
        let start_time = frames.first().map(|f| f.time).unwrap_or(0.0);
        for f in frames {
            let mut cloned = f.clone();
            cloned.time = base + (f.time - start_time) + 1e-6;
            cloned.origin_pos = inner.frames.len();
            inner.frames.push(cloned);
        }
        if let Some(n) = inner.final_count.as_mut() {
            *n = inner.frames.len();
        }
        self.cond.notify_all();
    }

    pub fn register_iterator(&self) {
        self.live_iterators.fetch_add(1, Ordering::SeqCst);
    }

    pub fn unregister_iterator(&self) {
        self.live_iterators.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn live_iterator_count(&self) -> usize {
        self.live_iterators.load(Ordering::SeqCst)
    }

    pub fn is_finalised(&self) -> bool {
        self.finalised.load(Ordering::SeqCst)
    }

    /// Duration in seconds; may grow until [`Medium::is_finalised`].
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_millis.load(Ordering::Relaxed).max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_medium() -> Arc<Medium> {
        Medium::new(
            MediaKind::Video,
            CodecId::Mpeg4Video,
            96,
            90000,
            vec![],
            "test.mp4".into(),
            0,
        )
    }

    fn push(m: &Arc<Medium>, time: f64, is_key: bool) {
        m.push_frame(Frame {
            time,
            payload: vec![0u8],
            payload_type: 96,
            is_key,
            origin_pos: 0,
        });
    }

    #[test]
    fn frame_at_blocks_until_produced_then_returns() {
        let m = make_medium();
        push(&m, 0.0, true);
        assert_eq!(m.frame_at(0).unwrap().time, 0.0);
    }

    #[test]
    fn frame_at_out_of_bounds_after_finalise() {
        let m = make_medium();
        push(&m, 0.0, true);
        m.finalise();
        assert!(m.frame_at(5).is_err());
    }

    #[test]
    fn frame_count_blocks_until_finalised() {
        let m = make_medium();
        push(&m, 0.0, true);
        push(&m, 1.0, false);
        m.finalise();
        assert_eq!(m.frame_count(), 2);
    }

    #[test]
    fn frame_pos_video_rounds_to_key_frame() {
        let m = make_medium();
        push(&m, 0.0, true);
        push(&m, 1.0, false);
        push(&m, 2.0, true);
        m.finalise();
        // Asking for t=1.5 must land on the key frame at t=2.0, not the
        // non-key frame at t=1.0.
        assert_eq!(m.frame_pos(1.5).unwrap(), 2);
    }

    #[test]
    fn insert_shifts_subsequent_frames_and_stays_monotonic() {
        let m = make_medium();
        push(&m, 0.0, true);
        push(&m, 5.0, true);
        let splice = vec![Frame {
            time: 0.0,
            payload: vec![9],
            payload_type: 96,
            is_key: true,
            origin_pos: 0,
        }];
        m.insert(&splice, 2.0);
        m.finalise();
        let times: Vec<f64> = (0..m.frame_count())
            .map(|i| m.frame_at(i).unwrap().time)
            .collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(times.len(), 3);
    }

    #[test]
    fn insert_gap_shifts_without_adding_frames() {
        let m = make_medium();
        push(&m, 0.0, true);
        push(&m, 5.0, true);
        m.insert_gap(2.0, 2.0);
        m.finalise();
        assert_eq!(m.frame_count(), 2);
        assert_eq!(m.frame_at(1).unwrap().time, 7.0);
    }
}
