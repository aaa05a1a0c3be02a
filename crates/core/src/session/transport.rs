//! Parses the `Transport` request header (RFC 2326 §12.39, spec §6) into
//! either the UDP or the TCP-interleaved shape SETUP negotiates.

/// What a client asked for in its `Transport:` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestedTransport {
    /// `RTP/AVP;unicast;client_port=p-p+1`.
    Udp { client_rtp_port: u16, client_rtcp_port: u16 },
    /// `RTP/AVP/TCP;interleaved=c-c+1`.
    Interleaved { rtp_channel: u8, rtcp_channel: u8 },
}

impl RequestedTransport {
    /// Parse the header value, preferring whichever shape its parameters
    /// name (`client_port=` or `interleaved=`); `None` if neither
    /// parameter is present or malformed.
    pub fn parse(header: &str) -> Option<Self> {
        for part in header.split(';') {
            let part = part.trim();
            if let Some(ports) = part.strip_prefix("client_port=") {
                let (a, b) = ports.split_once('-')?;
                return Some(RequestedTransport::Udp {
                    client_rtp_port: a.parse().ok()?,
                    client_rtcp_port: b.parse().ok()?,
                });
            }
            if let Some(channels) = part.strip_prefix("interleaved=") {
                let (a, b) = channels.split_once('-')?;
                return Some(RequestedTransport::Interleaved {
                    rtp_channel: a.parse().ok()?,
                    rtcp_channel: b.parse().ok()?,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_udp_transport() {
        let t = RequestedTransport::parse("RTP/AVP;unicast;client_port=5000-5001").unwrap();
        assert_eq!(
            t,
            RequestedTransport::Udp {
                client_rtp_port: 5000,
                client_rtcp_port: 5001
            }
        );
    }

    #[test]
    fn parse_interleaved_transport() {
        let t = RequestedTransport::parse("RTP/AVP/TCP;interleaved=0-1").unwrap();
        assert_eq!(
            t,
            RequestedTransport::Interleaved {
                rtp_channel: 0,
                rtcp_channel: 1
            }
        );
    }

    #[test]
    fn parse_no_recognised_params() {
        assert!(RequestedTransport::parse("RTP/AVP;unicast").is_none());
    }
}
