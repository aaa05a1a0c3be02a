//! AAC packetiser, `mpeg4-generic` / AAC-hbr (RFC 3640 §3.2.1): each
//! packet carries a 2-byte AU-headers-length (bit count of the
//! AU-header section that follows, always 16 for one AU-header) then a
//! 2-byte AU-header itself — a 13-bit AU size and a 3-bit index, always
//! 0 for the first AU-header in a stream with no interleaving (spec
//! §4.4). Marker is set on the last fragment of a frame.

use crate::media::Frame;
use crate::media::packetiser::{CodecId, Packetiser, RtpPacket};
use crate::media::rtp::RtpHeader;

use super::{build_packet, chunks};

const MAX_FRAME: usize = 8191; // 13-bit AU size field
const FRAGMENT_HEADER_LEN: usize = 4;

pub struct AacPacketiser {
    header: RtpHeader,
    clock_rate: u32,
}

impl AacPacketiser {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        AacPacketiser {
            header: RtpHeader::new(pt, ssrc),
            clock_rate: 48000,
        }
    }

    fn au_header(size: usize) -> [u8; 2] {
        let size = (size.min(MAX_FRAME) as u16) & 0x1FFF;
        // 13-bit size, 3-bit index (always 0).
        (size << 3).to_be_bytes()
    }
}

impl Packetiser for AacPacketiser {
    fn packetise(&mut self, frame: &Frame, rtp_timestamp: u32, mtu: usize) -> Vec<RtpPacket> {
        let payload = if frame.payload.len() > MAX_FRAME {
            tracing::warn!(len = frame.payload.len(), max = MAX_FRAME, "AAC frame exceeds max frame size, truncating");
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
            .map(|(i, (_offset, chunk))| {
                let mut fragment_header = [0u8; FRAGMENT_HEADER_LEN];
                // AU-headers-length in bits: one 16-bit AU-header.
                fragment_header[0..2].copy_from_slice(&16u16.to_be_bytes());
                fragment_header[2..4].copy_from_slice(&Self::au_header(chunk.len()));
                build_packet(
                    &mut self.header,
                    i == last,
                    rtp_timestamp,
                    &fragment_header,
                    chunk,
                    i == last,
                )
            })
            .collect()
    }

    fn codec_id(&self) -> CodecId {
        CodecId::Aac
    }

    fn payload_type(&self) -> u8 {
        self.header.pt
    }

    fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    fn sdp_attributes(&self, extradata: &[u8]) -> Vec<String> {
        let config = hex_encode(extradata);
        vec![
            format!("rtpmap:{} mpeg4-generic/{}", self.header.pt, self.clock_rate),
            format!(
                "fmtp:{} profile-level-id=1;mode=AAC-hbr;sizeLength=13;indexLength=3;indexDeltaLength=3;config={}",
                self.header.pt, config
            ),
        ]
    }

    fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
