use rand::Rng;

/// Generic RTP fixed header builder (RFC 3550 §5.1), shared by every
/// codec packetiser.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Sequence is 16-bit wrapping, incremented on every packet written. The
/// timestamp is always set explicitly from the session's presentation
/// clock (spec §4.1/§4.6) rather than advanced by a fixed increment, so
/// `write` takes it as a parameter. Version is always 2; padding,
/// extension, and CSRC count are always 0.
#[derive(Debug)]
pub struct RtpHeader {
    pub pt: u8,
    pub ssrc: u32,
    sequence: u16,
}

impl RtpHeader {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        RtpHeader {
            pt,
            ssrc,
            sequence: 0,
        }
    }

    /// Per RFC 3550 §8.1, the SSRC should be chosen randomly to minimize
    /// the probability of collisions between independent sessions.
    pub fn with_random_ssrc(pt: u8) -> Self {
        let ssrc = rand::rng().random::<u32>();
        Self::new(pt, ssrc)
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Serialize a 12-byte RTP fixed header and advance the sequence
    /// number. `timestamp` is the already-computed RTP clock value
    /// (spec §4.1 `rtp_timestamp`); all packets of one frame must be
    /// written with the same value.
    pub fn write(&mut self, marker: bool, timestamp: u32) -> [u8; 12] {
        let first_byte: u8 = 2 << 6;
        let second_byte: u8 = ((marker as u8) << 7) | self.pt;

        let mut header = [0u8; 12];
        header[0] = first_byte;
        header[1] = second_byte;
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&timestamp.to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        self.sequence = self.sequence.wrapping_add(1);
        header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header() -> RtpHeader {
        RtpHeader::new(96, 0xAABBCCDD)
    }

    #[test]
    fn version_is_2() {
        let mut h = make_header();
        let buf = h.write(false, 0);
        assert_eq!(buf[0] >> 6, 2);
    }

    #[test]
    fn marker_bit() {
        let mut h = make_header();
        let no_marker = h.write(false, 0);
        assert_eq!(no_marker[1] & 0x80, 0);
        let with_marker = h.write(true, 0);
        assert_eq!(with_marker[1] & 0x80, 0x80);
    }

    #[test]
    fn sequence_increments_and_wraps() {
        let mut h = make_header();
        h.sequence = u16::MAX;
        let buf = h.write(false, 0);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), u16::MAX);
        assert_eq!(h.sequence(), 0);
    }

    #[test]
    fn timestamp_is_written_verbatim() {
        let mut h = make_header();
        let buf = h.write(false, 3000);
        assert_eq!(u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]), 3000);
    }

    #[test]
    fn random_ssrc_differs() {
        let h1 = RtpHeader::with_random_ssrc(96);
        let h2 = RtpHeader::with_random_ssrc(96);
        assert_ne!(h1.ssrc, h2.ssrc);
    }
}
