//! One-shot control channel (spec §4.8 point 3): writes append to the
//! RTSP response buffer instead of going out over a socket. Used rarely,
//! for embedded base64 payloads in a response header.

use crate::error::{Result, StreamdError, TransportError};

use super::Channel;

pub struct ControlChannel {
    buffer: Vec<u8>,
    written: bool,
}

impl ControlChannel {
    pub fn new() -> Self {
        ControlChannel {
            buffer: Vec::new(),
            written: false,
        }
    }

    /// Consume the channel, returning whatever was written.
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for ControlChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for ControlChannel {
    fn write_some(&mut self, data: &[u8]) -> Result<usize> {
        self.buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn write_last(&mut self, data: &[u8]) -> Result<usize> {
        if self.written {
            return Err(StreamdError::Transport(TransportError::Hard(
                "control channel already written".into(),
            )));
        }
        self.written = true;
        self.write_some(data)
    }

    fn read_some(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(StreamdError::UnsupportedTransport(
            "control channel is write-only".into(),
        ))
    }

    fn description(&self) -> String {
        "control://one-shot".to_string()
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_last_appends_and_marks_written() {
        let mut c = ControlChannel::new();
        c.write_some(b"abc").unwrap();
        c.write_last(b"def").unwrap();
        assert_eq!(c.into_inner(), b"abcdef");
    }

    #[test]
    fn second_write_last_errors() {
        let mut c = ControlChannel::new();
        c.write_last(b"once").unwrap();
        assert!(c.write_last(b"twice").is_err());
    }
}
