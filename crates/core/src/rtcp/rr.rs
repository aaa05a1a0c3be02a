//! Receiver Report parsing (RFC 3550 §6.4.2). Only decode is needed —
//! this engine never emits RRs, it only consumes the ones clients send.

#[derive(Debug, Clone)]
pub struct ReceptionReport {
    pub ssrc: u32,
    pub fraction_lost: u8,
    pub cumulative_lost: u32,
    pub highest_sequence: u32,
    pub jitter: u32,
    pub last_sr: u32,
    pub delay_since_last_sr: u32,
}

#[derive(Debug, Clone)]
pub struct ReceiverReport {
    pub sender_ssrc: u32,
    pub reports: Vec<ReceptionReport>,
}

impl ReceiverReport {
    /// Parse a single RR packet (not a compound walk — the caller splits
    /// compound packets before calling this, per RFC 3550 §6.1).
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < 8 {
            return None;
        }
        let rc = buf[0] & 0x1F;
        let pt = buf[1];
        if pt != super::pt::RR {
            return None;
        }
        let sender_ssrc = u32::from_be_bytes(buf[4..8].try_into().ok()?);

        let mut reports = Vec::with_capacity(rc as usize);
        let mut offset = 8usize;
        for _ in 0..rc {
            if buf.len() < offset + 24 {
                break;
            }
            let block = &buf[offset..offset + 24];
            let ssrc = u32::from_be_bytes(block[0..4].try_into().ok()?);
            let fraction_lost = block[4];
            let cumulative_lost = u32::from_be_bytes([0, block[5], block[6], block[7]]);
            let highest_sequence = u32::from_be_bytes(block[8..12].try_into().ok()?);
            let jitter = u32::from_be_bytes(block[12..16].try_into().ok()?);
            let last_sr = u32::from_be_bytes(block[16..20].try_into().ok()?);
            let delay_since_last_sr = u32::from_be_bytes(block[20..24].try_into().ok()?);
            reports.push(ReceptionReport {
                ssrc,
                fraction_lost,
                cumulative_lost,
                highest_sequence,
                jitter,
                last_sr,
                delay_since_last_sr,
            });
            offset += 24;
        }

        Some(ReceiverReport {
            sender_ssrc,
            reports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rr_bytes(num_reports: u8) -> Vec<u8> {
        let mut buf = vec![0x80 | num_reports, super::super::pt::RR, 0x00, 0x01];
        buf.extend_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
        for i in 0..num_reports {
            buf.extend_from_slice(&(0x1000u32 + i as u32).to_be_bytes());
            buf.push(5); // fraction lost
            buf.extend_from_slice(&[0, 0, 2]); // cumulative lost = 2
            buf.extend_from_slice(&100u32.to_be_bytes());
            buf.extend_from_slice(&50u32.to_be_bytes());
            buf.extend_from_slice(&0u32.to_be_bytes());
            buf.extend_from_slice(&0u32.to_be_bytes());
        }
        buf
    }

    #[test]
    fn decode_parses_sender_ssrc_and_blocks() {
        let bytes = sample_rr_bytes(2);
        let rr = ReceiverReport::decode(&bytes).unwrap();
        assert_eq!(rr.sender_ssrc, 0xDEAD_BEEF);
        assert_eq!(rr.reports.len(), 2);
        assert_eq!(rr.reports[0].cumulative_lost, 2);
        assert_eq!(rr.reports[1].ssrc, 0x1001);
    }

    #[test]
    fn wrong_packet_type_returns_none() {
        let mut bytes = sample_rr_bytes(0);
        bytes[1] = super::super::pt::SR;
        assert!(ReceiverReport::decode(&bytes).is_none());
    }
}
