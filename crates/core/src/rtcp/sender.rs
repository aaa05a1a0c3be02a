//! RTCP sender/receiver tasks (spec §4.7): one dedicated thread each,
//! both cancellable and pausable alongside the RTP session they serve.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::clock::Timeline;
use crate::transport::Channel;

use super::{Bye, ReceiverReport, SenderReport, SourceDescription};

/// Running counters the pacing loop updates as it sends RTP packets,
/// and the RTCP sender reads to build each Sender Report.
#[derive(Default)]
pub struct SessionStats {
    packets_sent: AtomicU64,
    octets_sent: AtomicU64,
    pub cumulative_lost: AtomicU32,
    pub jitter: AtomicU32,
    pub bye_received: AtomicBool,
}

impl SessionStats {
    pub fn record_sent(&self, octets: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.octets_sent.fetch_add(octets as u64, Ordering::Relaxed);
    }

    pub fn packets_sent(&self) -> u32 {
        self.packets_sent.load(Ordering::Relaxed) as u32
    }

    pub fn octets_sent(&self) -> u32 {
        self.octets_sent.load(Ordering::Relaxed) as u32
    }
}

struct Pause {
    paused: Mutex<bool>,
    cond: Condvar,
}

impl Pause {
    fn new() -> Self {
        Pause {
            paused: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn set(&self, paused: bool) {
        *self.paused.lock() = paused;
        self.cond.notify_all();
    }

    /// Blocks while paused; wakes immediately on stop too since callers
    /// check `stopped` themselves after each wait.
    fn wait_while_paused(&self, stopped: &AtomicBool, timeout: Duration) {
        let mut guard = self.paused.lock();
        while *guard && !stopped.load(Ordering::SeqCst) {
            self.cond.wait_for(&mut guard, timeout);
        }
    }
}

/// Periodically emits a combined SR + SDES compound packet (spec §4.7
/// "Sender").
pub struct RtcpSender {
    channel: Mutex<Box<dyn Channel>>,
    timeline: Arc<Mutex<Timeline>>,
    stats: Arc<SessionStats>,
    ssrc: u32,
    cname: String,
    clock_rate: u32,
    interval: Duration,
    stopped: Arc<AtomicBool>,
    pause: Arc<Pause>,
}

impl RtcpSender {
    pub fn new(
        channel: Box<dyn Channel>,
        timeline: Arc<Mutex<Timeline>>,
        stats: Arc<SessionStats>,
        ssrc: u32,
        cname: String,
        clock_rate: u32,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(RtcpSender {
            channel: Mutex::new(channel),
            timeline,
            stats,
            ssrc,
            cname,
            clock_rate,
            interval,
            stopped: Arc::new(AtomicBool::new(false)),
            pause: Arc::new(Pause::new()),
        })
    }

    pub fn spawn(self: &Arc<Self>) {
        let this = self.clone();
        std::thread::spawn(move || this.run());
    }

    fn run(self: Arc<Self>) {
        while !self.stopped.load(Ordering::SeqCst) {
            self.pause.wait_while_paused(&self.stopped, self.interval);
            if self.stopped.load(Ordering::SeqCst) {
                return;
            }
            self.send_report();
            std::thread::sleep(self.interval);
        }
    }

    fn send_report(&self) {
        let rtp_time = {
            let timeline = self.timeline.lock();
            Timeline::rtp_timestamp(timeline.presentation_now(), self.clock_rate)
        };
        let sr = SenderReport {
            ssrc: self.ssrc,
            ntp_time: super::ntp_now(),
            rtp_time,
            packet_count: self.stats.packets_sent(),
            octet_count: self.stats.octets_sent(),
        };
        let sdes = SourceDescription {
            ssrc: self.ssrc,
            cname: self.cname.clone(),
        };

        let mut compound = sr.encode();
        compound.extend_from_slice(&sdes.encode());

        let mut channel = self.channel.lock();
        if let Err(e) = channel.write_last(&compound) {
            tracing::warn!(error = %e, "RTCP SR write failed");
        }
    }

    pub fn pause_sending(&self) {
        self.pause.set(true);
    }

    pub fn resume_sending(&self) {
        self.pause.set(false);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.pause.cond.notify_all();
    }
}

/// Polls for Receiver Reports and BYE (spec §4.7 "Receiver").
pub struct RtcpReceiver {
    channel: Mutex<Box<dyn Channel>>,
    stats: Arc<SessionStats>,
    poll_interval: Duration,
    stopped: Arc<AtomicBool>,
}

impl RtcpReceiver {
    pub fn new(channel: Box<dyn Channel>, stats: Arc<SessionStats>, poll_interval: Duration) -> Arc<Self> {
        Arc::new(RtcpReceiver {
            channel: Mutex::new(channel),
            stats,
            poll_interval,
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn spawn(self: &Arc<Self>) {
        let this = self.clone();
        std::thread::spawn(move || this.run());
    }

    fn run(self: Arc<Self>) {
        let mut buf = vec![0u8; 1500];
        while !self.stopped.load(Ordering::SeqCst) {
            let n = {
                let mut channel = self.channel.lock();
                channel.read_some(&mut buf)
            };
            match n {
                Ok(n) if n > 0 => self.handle_packet(&buf[..n]),
                Ok(_) => {}
                Err(crate::error::StreamdError::Transport(crate::error::TransportError::Timeout)) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "RTCP receive ended");
                    return;
                }
            }
        }
    }

    fn handle_packet(&self, buf: &[u8]) {
        if buf.len() < 2 {
            return;
        }
        match buf[1] {
            pt if pt == super::pt::RR => {
                if let Some(rr) = ReceiverReport::decode(buf) {
                    if let Some(first) = rr.reports.first() {
                        self.stats.cumulative_lost.store(first.cumulative_lost, Ordering::Relaxed);
                        self.stats.jitter.store(first.jitter, Ordering::Relaxed);
                    }
                }
            }
            pt if pt == super::pt::BYE => {
                if Bye::decode(buf).is_some() {
                    self.stats.bye_received.store(true, Ordering::SeqCst);
                }
            }
            _ => {}
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
