//! MP3-ADU packetiser (RFC 5219, optional codec per spec §4.4): each
//! packet is prefixed with a 1- or 2-byte ADU size descriptor — one byte
//! if the ADU fits in 7 bits, otherwise two bytes with the top bit of
//! the first byte set as a continuation marker. Marker is never set for
//! this codec.

use crate::media::Frame;
use crate::media::packetiser::{CodecId, Packetiser, RtpPacket};
use crate::media::rtp::RtpHeader;

use super::{build_packet, chunks};

const MAX_FRAME: usize = 262143;

pub struct Mp3AduPacketiser {
    header: RtpHeader,
    clock_rate: u32,
}

impl Mp3AduPacketiser {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Mp3AduPacketiser {
            header: RtpHeader::new(pt, ssrc),
            clock_rate: 90000,
        }
    }

    /// 1-byte descriptor for sizes < 128, else a 2-byte descriptor with
    /// the continuation bit set on the first byte.
    fn descriptor(size: usize) -> Vec<u8> {
        if size < 0x80 {
            vec![size as u8]
        } else {
            let size = size.min(0x7FFF) as u16;
            vec![0x80 | (size >> 8) as u8, (size & 0xFF) as u8]
        }
    }
}

impl Packetiser for Mp3AduPacketiser {
    fn packetise(&mut self, frame: &Frame, rtp_timestamp: u32, mtu: usize) -> Vec<RtpPacket> {
        let payload = if frame.payload.len() > MAX_FRAME {
            tracing::warn!(len = frame.payload.len(), max = MAX_FRAME, "MP3-ADU frame exceeds max frame size, truncating");
            &frame.payload[..MAX_FRAME]
        } else {
            &frame.payload[..]
        };

        let descriptor = Self::descriptor(payload.len());
        let chunk_max = mtu.saturating_sub(12 + descriptor.len()).max(1);
        let parts = chunks(payload, chunk_max);
        let last = parts.len().saturating_sub(1);

        parts
            .into_iter()
            .enumerate()
            .map(|(i, (_offset, chunk))| {
                // Per RFC 5219, the descriptor precedes only the first
                // fragment; subsequent fragments of the same ADU carry
                // none.
                let fragment_header: &[u8] = if i == 0 { &descriptor } else { &[] };
                build_packet(&mut self.header, false, rtp_timestamp, fragment_header, chunk, i == last)
            })
            .collect()
    }

    fn codec_id(&self) -> CodecId {
        CodecId::Mp3Adu
    }

    fn payload_type(&self) -> u8 {
        self.header.pt
    }

    fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    fn sdp_attributes(&self, _extradata: &[u8]) -> Vec<String> {
        vec![format!("rtpmap:{} mpa-robust/{}", self.header.pt, self.clock_rate)]
    }

    fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::codecs::sample_frame;

    #[test]
    fn small_adu_uses_one_byte_descriptor() {
        let mut p = Mp3AduPacketiser::new(98, 1);
        let frame = sample_frame(vec![1u8; 50], false);
        let packets = p.packetise(&frame, 0, 1400);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].bytes[12], 50);
    }

    #[test]
    fn large_adu_uses_two_byte_descriptor_with_continuation_bit() {
        let mut p = Mp3AduPacketiser::new(98, 1);
        let frame = sample_frame(vec![2u8; 200], false);
        let packets = p.packetise(&frame, 0, 1400);
        let b0 = packets[0].bytes[12];
        let b1 = packets[0].bytes[13];
        assert_eq!(b0 & 0x80, 0x80);
        let size = (((b0 & 0x7F) as u16) << 8) | b1 as u16;
        assert_eq!(size, 200);
    }

    #[test]
    fn marker_never_set() {
        let mut p = Mp3AduPacketiser::new(98, 1);
        let frame = sample_frame(vec![0u8; 500], false);
        let packets = p.packetise(&frame, 0, 12 + 2 + 50);
        assert!(packets.len() > 1);
        for packet in &packets {
            assert_eq!(packet.bytes[1] & 0x80, 0);
        }
    }
}
