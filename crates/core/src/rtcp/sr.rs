//! Sender Report (RFC 3550 §6.4.1), grounded on `mycrl-turn-rs`'s `Sr`
//! wire layout. This engine never needs to parse an SR (only emit one),
//! so only `encode` is implemented.

use super::rtcp_header;

#[derive(Debug, Clone)]
pub struct SenderReport {
    pub ssrc: u32,
    pub ntp_time: u64,
    pub rtp_time: u32,
    pub packet_count: u32,
    pub octet_count: u32,
}

impl SenderReport {
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(24);
        body.extend_from_slice(&self.ssrc.to_be_bytes());
        body.extend_from_slice(&self.ntp_time.to_be_bytes());
        body.extend_from_slice(&self.rtp_time.to_be_bytes());
        body.extend_from_slice(&self.packet_count.to_be_bytes());
        body.extend_from_slice(&self.octet_count.to_be_bytes());

        let length_words = (body.len() / 4) as u16; // header word excluded per RFC 3550 length rule
        let mut packet = rtcp_header(super::pt::SR, 0, length_words).to_vec();
        packet.extend_from_slice(&body);
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_has_sr_packet_type_and_no_report_blocks() {
        let sr = SenderReport {
            ssrc: 0x0102_0304,
            ntp_time: 0xAABBCCDD_11223344,
            rtp_time: 90000,
            packet_count: 10,
            octet_count: 1400,
        };
        let bytes = sr.encode();
        assert_eq!(bytes[1], super::super::pt::SR);
        assert_eq!(bytes[0] >> 6, 2);
        assert_eq!(bytes[0] & 0x1F, 0); // rc = 0
        assert_eq!(u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 0x0102_0304);
    }
}
