//! MPEG-4 video packetiser, RFC 6416 "header-free" mode: no
//! fragmentation header at all, just raw VOP bytes split across
//! packets. Marker is set on the packet carrying the last byte of a VOP
//! (spec §4.4); max frame size is MTU-bound only, i.e. unbounded here —
//! the pre-buffer never hands this packetiser a frame larger than what
//! fits in many MTU-sized packets.

use crate::media::Frame;
use crate::media::packetiser::{CodecId, Packetiser, RtpPacket};
use crate::media::rtp::RtpHeader;

use super::{build_packet, chunks};

pub struct Mpeg4VideoPacketiser {
    header: RtpHeader,
    clock_rate: u32,
}

impl Mpeg4VideoPacketiser {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Mpeg4VideoPacketiser {
            header: RtpHeader::new(pt, ssrc),
            clock_rate: 90000,
        }
    }
}

impl Packetiser for Mpeg4VideoPacketiser {
    fn packetise(&mut self, frame: &Frame, rtp_timestamp: u32, mtu: usize) -> Vec<RtpPacket> {
        let chunk_max = mtu.saturating_sub(12).max(1);
        let parts = chunks(&frame.payload, chunk_max);
        let last = parts.len().saturating_sub(1);

        parts
            .into_iter()
            .enumerate()
            .map(|(i, (_offset, chunk))| {
                build_packet(&mut self.header, i == last, rtp_timestamp, &[], chunk, i == last)
            })
            .collect()
    }

    fn codec_id(&self) -> CodecId {
        CodecId::Mpeg4Video
    }

    fn payload_type(&self) -> u8 {
        self.header.pt
    }

    fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    fn sdp_attributes(&self, extradata: &[u8]) -> Vec<String> {
        let config = extradata.iter().map(|b| format!("{:02x}", b)).collect::<String>();
        vec![
            format!("rtpmap:{} MP4V-ES/{}", self.header.pt, self.clock_rate),
            format!("fmtp:{} profile-level-id=1;config={}", self.header.pt, config),
        ]
    }

    fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }
}
