//! RTCP sender/receiver (spec §4.7), grounded on the wire layout in
//! `mycrl-turn-rs`'s `Sr`/`Source` structs but written as fixed-size
//! encode/decode functions rather than a `TryFrom` parser, since this
//! engine only ever emits one SR/SDES pair and consumes one RR/BYE pair
//! per session — there is no general compound-packet walker to build.

pub mod bye;
pub mod rr;
pub mod sdes;
pub mod sender;
pub mod sr;

pub use bye::Bye;
pub use rr::{ReceiverReport, ReceptionReport};
pub use sdes::SourceDescription;
pub use sender::{RtcpReceiver, RtcpSender, SessionStats};
pub use sr::SenderReport;

/// RTCP packet type field values used by this engine (RFC 3550 §12.1).
pub mod pt {
    pub const SR: u8 = 200;
    pub const RR: u8 = 201;
    pub const SDES: u8 = 202;
    pub const BYE: u8 = 203;
}

/// SDES item type for CNAME (RFC 3550 §6.5.1).
pub const SDES_CNAME: u8 = 1;

/// Unix epoch -> NTP epoch offset in seconds (1900-01-01 to 1970-01-01).
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Wall-clock time as a 32.32 fixed-point NTP timestamp (spec §4.7
/// "NTP wall time split into 32.32").
pub fn ntp_now() -> u64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let seconds = now.as_secs() + NTP_UNIX_OFFSET;
    let frac = ((now.subsec_nanos() as u64) << 32) / 1_000_000_000;
    (seconds << 32) | frac
}

fn rtcp_header(pt: u8, rc: u8, length_words: u16) -> [u8; 4] {
    let mut header = [0u8; 4];
    header[0] = (2 << 6) | rc; // version=2, padding=0
    header[1] = pt;
    header[2..4].copy_from_slice(&length_words.to_be_bytes());
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntp_now_is_after_y2k_in_ntp_epoch() {
        let ts = ntp_now();
        let seconds = ts >> 32;
        // NTP seconds for 2000-01-01 relative to 1900 epoch.
        assert!(seconds > 3_155_760_000);
    }
}
