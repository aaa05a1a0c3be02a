//! Presentation clock / Timeline (spec §4.1).
//!
//! Maps wall time to media presentation time at a configurable speed, with
//! pause/unpause and a user-agent specialisation for RTP timestamp base
//! quirks (spec §9 open question: "always start from 0 at PLAY, add
//! `round(from*rate)` when seeking").

use std::time::Instant;

/// User-agent specialisation. Certain clients need a non-zero RTP base or
/// particular wrap handling; picked once from the `User-Agent` header at
/// RTSP-session creation (spec §4.1, §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAgent {
    Generic,
    Vlc1_0_2,
    Vlc1_0_6,
    Vlc1_1_4,
}

impl UserAgent {
    /// Classify a `User-Agent` header value.
    pub fn detect(header: Option<&str>) -> Self {
        let Some(ua) = header else {
            return UserAgent::Generic;
        };
        if ua.contains("VLC/1.0.2") {
            UserAgent::Vlc1_0_2
        } else if ua.contains("VLC/1.0.6") {
            UserAgent::Vlc1_0_6
        } else if ua.contains("VLC/1.1.4") {
            UserAgent::Vlc1_1_4
        } else {
            UserAgent::Generic
        }
    }

    /// Additional RTP-timestamp offset (in presentation seconds) this agent
    /// expects on top of the PLAY `from` value. The older VLC builds
    /// historically disagreed with the spec-of-record "start from 0, add
    /// round(from*rate) on seek" rule; we normalise all variants to that
    /// rule and keep this hook for a future per-agent quirk.
    pub fn timestamp_base_offset(&self) -> f64 {
        0.0
    }
}

/// Per-RTP-session mapping from wall time to presentation time under a
/// configurable, possibly negative, playback speed.
///
/// `play`/`pause`/`unpause` record just enough state (`origin_wall`,
/// `origin_pts`, `speed`) to answer `presentation_now()` without a thread
/// of its own — callers (the pacing loop) poll it.
#[derive(Debug)]
pub struct Timeline {
    agent: UserAgent,
    origin_wall: Instant,
    origin_pts: f64,
    speed: f64,
    paused: bool,
    paused_pts: f64,
}

impl Timeline {
    pub fn new(agent: UserAgent) -> Self {
        Timeline {
            agent,
            origin_wall: Instant::now(),
            origin_pts: 0.0,
            speed: 1.0,
            paused: true,
            paused_pts: 0.0,
        }
    }

    pub fn agent(&self) -> UserAgent {
        self.agent
    }

    /// `play(from, speed, wall_now)` — sets origin such that
    /// `presentation(wall_now) = from` and `d/dt presentation = speed`.
    pub fn play(&mut self, from: f64, speed: f64, wall_now: Instant) {
        self.origin_wall = wall_now;
        self.origin_pts = from;
        self.speed = speed;
        self.paused = false;
    }

    /// Freezes presentation at its current value.
    pub fn pause(&mut self, wall_now: Instant) {
        if !self.paused {
            self.paused_pts = self.presentation_at(wall_now);
            self.paused = true;
        }
    }

    /// Resumes using the last `(from, speed)`, continuing from the frozen
    /// presentation time.
    pub fn unpause(&mut self, wall_now: Instant) {
        if self.paused {
            self.origin_wall = wall_now;
            self.origin_pts = self.paused_pts;
            self.paused = false;
        }
    }

    fn presentation_at(&self, wall_now: Instant) -> f64 {
        if self.paused {
            return self.paused_pts;
        }
        let elapsed = wall_now
            .saturating_duration_since(self.origin_wall)
            .as_secs_f64();
        self.origin_pts + elapsed * self.speed
    }

    pub fn presentation_now(&self) -> f64 {
        self.presentation_at(Instant::now())
    }

    pub fn speed_now(&self) -> f64 {
        self.speed
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// `rtp_timestamp(presentation_t) = round(t * rate) mod 2^32` (spec §4.1).
    pub fn rtp_timestamp(presentation_t: f64, rate: u32) -> u32 {
        let scaled = (presentation_t * rate as f64).round();
        // Rust's `as u32` on a negative f64 saturates to 0, which is wrong
        // for reverse playback; wrap through i64 first (spec allows
        // negative `from` after Scale:-1, §9).
        (scaled as i64).rem_euclid(1i64 << 32) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn play_then_presentation_advances_with_speed() {
        let mut t = Timeline::new(UserAgent::Generic);
        let t0 = Instant::now();
        t.play(0.0, 1.0, t0);
        assert_eq!(t.presentation_at(t0), 0.0);
        assert_eq!(t.presentation_at(t0 + Duration::from_secs(2)), 2.0);
    }

    #[test]
    fn negative_speed_counts_down() {
        let mut t = Timeline::new(UserAgent::Generic);
        let t0 = Instant::now();
        t.play(10.0, -1.0, t0);
        assert_eq!(t.presentation_at(t0 + Duration::from_secs(3)), 7.0);
    }

    #[test]
    fn pause_unpause_preserves_position() {
        let mut t = Timeline::new(UserAgent::Generic);
        let t0 = Instant::now();
        t.play(0.0, 1.0, t0);
        let t1 = t0 + Duration::from_secs(2);
        t.pause(t1);
        assert_eq!(t.presentation_at(t1 + Duration::from_secs(5)), 2.0);
        t.unpause(t1 + Duration::from_secs(5));
        assert_eq!(
            t.presentation_at(t1 + Duration::from_secs(8)),
            2.0 + 3.0
        );
    }

    #[test]
    fn rtp_timestamp_matches_formula() {
        assert_eq!(Timeline::rtp_timestamp(1.0, 90000), 90000);
        assert_eq!(Timeline::rtp_timestamp(0.0, 90000), 0);
    }

    #[test]
    fn rtp_timestamp_wraps_u32() {
        // 2^32 / 90000 seconds of presentation time should wrap exactly to 0.
        let wrap_point = (1u64 << 32) as f64 / 90000.0;
        let ts = Timeline::rtp_timestamp(wrap_point, 90000);
        assert_eq!(ts, 0);
    }

    #[test]
    fn detect_user_agent() {
        assert_eq!(UserAgent::detect(Some("VLC/1.0.2 LibVLC")), UserAgent::Vlc1_0_2);
        assert_eq!(UserAgent::detect(Some("ffplay")), UserAgent::Generic);
        assert_eq!(UserAgent::detect(None), UserAgent::Generic);
    }
}
