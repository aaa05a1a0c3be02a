//! Packetiser registry (spec §4.4): codec id -> (SDP reply, RTP
//! packetiser) dispatch, resolved once per session then monomorphic
//! within it (spec §9 "Polymorphism over codecs").

use super::Frame;
use super::rtp::RtpHeader;

/// A single RTP packet ready for the transport channel, with the
/// "is_last_of_sequence" flag transport uses to flush partial writes
/// (spec §4.4).
pub struct RtpPacket {
    pub bytes: Vec<u8>,
    pub is_last_of_sequence: bool,
}

/// Codec-specific RTP packetiser (spec §4.4 table).
///
/// Implementations convert one decoded [`Frame`] plus `(rtp_timestamp,
/// sequence counter)` into an ordered packet list. The counter and SSRC
/// live in the shared [`RtpHeader`] each packetiser owns.
pub trait Packetiser: Send {
    /// Split `frame` into one or more RTP packets at `rtp_timestamp`.
    fn packetise(&mut self, frame: &Frame, rtp_timestamp: u32, mtu: usize) -> Vec<RtpPacket>;

    fn codec_id(&self) -> CodecId;
    fn payload_type(&self) -> u8;
    fn clock_rate(&self) -> u32;
    fn sdp_attributes(&self, extradata: &[u8]) -> Vec<String>;
    fn next_sequence(&self) -> u16;
}

/// The four codecs spec §4.4 names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    /// MPEG-2 audio (MPA), RFC 2250 / RFC 3551 static PT 14 or dynamic.
    Mpa,
    /// AAC, `mpeg4-generic` / AAC-hbr (RFC 3640).
    Aac,
    /// MPEG-4 video (RFC 6416).
    Mpeg4Video,
    /// MP3-ADU (optional, RFC 5219).
    Mp3Adu,
}

/// Construct the packetiser for a codec id with an explicit SSRC.
pub fn make_packetiser(codec: CodecId, pt: u8, ssrc: u32) -> Box<dyn Packetiser> {
    match codec {
        CodecId::Mpa => Box::new(super::codecs::mpa::MpaPacketiser::new(pt, ssrc)),
        CodecId::Aac => Box::new(super::codecs::aac::AacPacketiser::new(pt, ssrc)),
        CodecId::Mpeg4Video => {
            Box::new(super::codecs::mpeg4video::Mpeg4VideoPacketiser::new(pt, ssrc))
        }
        CodecId::Mp3Adu => Box::new(super::codecs::mp3adu::Mp3AduPacketiser::new(pt, ssrc)),
    }
}

pub fn new_header(pt: u8, ssrc: u32) -> RtpHeader {
    RtpHeader::new(pt, ssrc)
}
