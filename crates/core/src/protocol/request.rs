use crate::error::{ParseErrorKind, Result};

/// A parsed RTSP request (RFC 2326 §6).
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Header lookup is case-insensitive per RFC 2326 §4.2.
#[derive(Debug)]
pub struct RtspRequest {
    pub method: String,
    pub uri: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RtspRequest {
    /// Parse an RTSP request from its header text; `body` is whatever
    /// the caller already read per `Content-Length` (spec §4.9's read
    /// loop reads headers first, then the declared body length).
    pub fn parse(raw: &str, body: Vec<u8>) -> Result<Self> {
        let mut lines = raw.lines();

        let request_line = lines.next().ok_or(ParseErrorKind::EmptyRequest)?;
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(ParseErrorKind::InvalidRequestLine.into());
        }

        let method = parts[0].to_string();
        let uri = parts[1].to_string();
        let version = parts[2].to_string();

        if version != "RTSP/1.0" {
            tracing::warn!(version, "client sent non-RTSP/1.0 version");
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let colon_pos = line.find(':').ok_or(ParseErrorKind::InvalidHeader)?;
            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();
            headers.push((name, value));
        }

        Ok(RtspRequest {
            method,
            uri,
            version,
            headers,
            body,
        })
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// RFC 2326 §12.17: numbers and orders the request/response pair.
    pub fn cseq(&self) -> Option<&str> {
        self.get_header("CSeq")
    }

    pub fn session_id(&self) -> Option<&str> {
        self.get_header("Session").map(|v| v.split(';').next().unwrap_or(v))
    }

    /// `Range: npt=from-to` (spec §6); an absent `to` means "play to
    /// end."
    pub fn range(&self) -> Option<(f64, Option<f64>)> {
        let raw = self.get_header("Range")?;
        let npt = raw.strip_prefix("npt=")?;
        let mut parts = npt.splitn(2, '-');
        let from: f64 = parts.next()?.parse().ok()?;
        let to = parts.next().and_then(|s| if s.is_empty() { None } else { s.parse().ok() });
        Some((from, to))
    }

    /// `Scale: <signed float>` (spec §6); defaults to `1.0` if absent.
    pub fn scale(&self) -> f64 {
        self.get_header("Scale")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_options_request() {
        let raw = "OPTIONS rtsp://localhost:8554/test RTSP/1.0\r\nCSeq: 1\r\n\r\n";
        let req = RtspRequest::parse(raw, vec![]).unwrap();
        assert_eq!(req.method, "OPTIONS");
        assert_eq!(req.uri, "rtsp://localhost:8554/test");
        assert_eq!(req.cseq(), Some("1"));
    }

    #[test]
    fn parse_setup_with_transport() {
        let raw = "SETUP rtsp://localhost:8554/test/track1 RTSP/1.0\r\n\
                   CSeq: 3\r\n\
                   Transport: RTP/AVP;unicast;client_port=8000-8001\r\n\r\n";
        let req = RtspRequest::parse(raw, vec![]).unwrap();
        assert_eq!(req.method, "SETUP");
        assert_eq!(
            req.get_header("Transport"),
            Some("RTP/AVP;unicast;client_port=8000-8001")
        );
    }

    #[test]
    fn parse_empty_request_errs() {
        assert!(RtspRequest::parse("", vec![]).is_err());
    }

    #[test]
    fn parse_invalid_request_line_errs() {
        assert!(RtspRequest::parse("JUST_A_METHOD\r\n\r\n", vec![]).is_err());
    }

    #[test]
    fn header_lookup_case_insensitive() {
        let raw = "OPTIONS rtsp://localhost RTSP/1.0\r\ncseq: 42\r\n\r\n";
        let req = RtspRequest::parse(raw, vec![]).unwrap();
        assert_eq!(req.get_header("CSeq"), Some("42"));
        assert_eq!(req.get_header("CSEQ"), Some("42"));
    }

    #[test]
    fn range_parses_npt_with_open_end() {
        let raw = "PLAY rtsp://h/s RTSP/1.0\r\nCSeq: 1\r\nRange: npt=5.0-\r\n\r\n";
        let req = RtspRequest::parse(raw, vec![]).unwrap();
        assert_eq!(req.range(), Some((5.0, None)));
    }

    #[test]
    fn range_parses_npt_with_closed_end() {
        let raw = "PLAY rtsp://h/s RTSP/1.0\r\nCSeq: 1\r\nRange: npt=5.0-10.0\r\n\r\n";
        let req = RtspRequest::parse(raw, vec![]).unwrap();
        assert_eq!(req.range(), Some((5.0, Some(10.0))));
    }

    #[test]
    fn scale_defaults_to_one() {
        let raw = "PLAY rtsp://h/s RTSP/1.0\r\nCSeq: 1\r\n\r\n";
        let req = RtspRequest::parse(raw, vec![]).unwrap();
        assert_eq!(req.scale(), 1.0);
    }

    #[test]
    fn scale_parses_negative_float() {
        let raw = "PLAY rtsp://h/s RTSP/1.0\r\nCSeq: 1\r\nScale: -2.0\r\n\r\n";
        let req = RtspRequest::parse(raw, vec![]).unwrap();
        assert_eq!(req.scale(), -2.0);
    }
}
