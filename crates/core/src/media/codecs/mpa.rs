//! MPEG-2 audio (MPA) packetiser, RFC 2250 §2: a 4-byte
//! MPEG-audio-specific header (16-bit reserved, always 0, followed by a
//! 16-bit fragment offset) prefixes every RTP packet. Marker is always
//! set; MPA frames aren't split into access units the way AAC/MP4V are,
//! so "last fragment" is just "last chunk of this frame" (spec §4.4).

use crate::media::Frame;
use crate::media::packetiser::{CodecId, Packetiser, RtpPacket};
use crate::media::rtp::RtpHeader;

use super::{build_packet, chunks};

const MAX_FRAME: usize = 65535;
const FRAGMENT_HEADER_LEN: usize = 4;

pub struct MpaPacketiser {
    header: RtpHeader,
    clock_rate: u32,
}

impl MpaPacketiser {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        MpaPacketiser {
            header: RtpHeader::new(pt, ssrc),
            clock_rate: 90000,
        }
    }
}

impl Packetiser for MpaPacketiser {
    fn packetise(&mut self, frame: &Frame, rtp_timestamp: u32, mtu: usize) -> Vec<RtpPacket> {
        let payload = if frame.payload.len() > MAX_FRAME {
            tracing::warn!(len = frame.payload.len(), max = MAX_FRAME, "MPA frame exceeds max frame size, truncating");
            &frame.payload[..MAX_FRAME]
        } else {
            &frame.payload[..]
        };

        let chunk_max = mtu.saturating_sub(12 + FRAGMENT_HEADER_LEN).max(1);
        let parts = chunks(payload, chunk_max);
        let last = parts.len().saturating_sub(1);

        parts
            .into_iter()
            .enumerate()
            .map(|(i, (offset, chunk))| {
                let mut fragment_header = [0u8; FRAGMENT_HEADER_LEN];
                fragment_header[2..4].copy_from_slice(&(offset as u16).to_be_bytes());
                build_packet(&mut self.header, true, rtp_timestamp, &fragment_header, chunk, i == last)
            })
            .collect()
    }

    fn codec_id(&self) -> CodecId {
        CodecId::Mpa
    }

    fn payload_type(&self) -> u8 {
        self.header.pt
    }

    fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    fn sdp_attributes(&self, _extradata: &[u8]) -> Vec<String> {
        vec![format!("rtpmap:{} MPA/{}", self.header.pt, self.clock_rate)]
    }

    fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }
}
