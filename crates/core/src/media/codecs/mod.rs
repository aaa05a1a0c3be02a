//! Concrete codec packetisers named in the registry table (spec §4.4).

pub mod aac;
pub mod mp3adu;
pub mod mpa;
pub mod mpeg4video;

use crate::media::Frame;
use crate::media::packetiser::RtpPacket;
use crate::media::rtp::RtpHeader;

/// Split `payload` into chunks no larger than `chunk_max`, pairing each
/// with its byte offset into the frame (used by MPA's fragment-offset
/// header) and whether it is the final chunk.
pub(super) fn chunks(payload: &[u8], chunk_max: usize) -> Vec<(usize, &[u8])> {
    if payload.is_empty() {
        return vec![(0, payload)];
    }
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < payload.len() {
        let end = (offset + chunk_max).min(payload.len());
        out.push((offset, &payload[offset..end]));
        offset = end;
    }
    out
}

/// Assemble one RTP packet: 12-byte fixed header, codec fragment header,
/// payload chunk.
pub(super) fn build_packet(
    header: &mut RtpHeader,
    marker: bool,
    timestamp: u32,
    fragment_header: &[u8],
    chunk: &[u8],
    is_last_of_sequence: bool,
) -> RtpPacket {
    let fixed = header.write(marker, timestamp);
    let mut bytes = Vec::with_capacity(fixed.len() + fragment_header.len() + chunk.len());
    bytes.extend_from_slice(&fixed);
    bytes.extend_from_slice(fragment_header);
    bytes.extend_from_slice(chunk);
    RtpPacket {
        bytes,
        is_last_of_sequence,
    }
}

#[cfg(test)]
pub(super) fn sample_frame(payload: Vec<u8>, is_key: bool) -> Frame {
    Frame {
        time: 0.0,
        payload,
        payload_type: 0,
        is_key,
        origin_pos: 0,
    }
}
