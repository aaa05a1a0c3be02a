//! Error taxonomy for the streaming engine.

use std::fmt;

/// Errors that can occur anywhere in the engine.
///
/// Variants map to the failure taxonomy design: each one knows the RTSP
/// status code it should surface as (see [`status_code`](Self::status_code)),
/// except the ones that are never supposed to reach a client.
#[derive(Debug, thiserror::Error)]
pub enum StreamdError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing key, file, medium, track or session.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation requested while the object is in the wrong state
    /// (e.g. PLAY on a session that was never SETUP).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Seek or index past the end of a sequence. Recovered internally as
    /// end-of-stream; never surfaced to a client except as a graceful EOS.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    /// Transport failure, subdivided per the loss-gate design (§4.6/§7).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Malformed RTSP request/response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Requested codec has no registered packetiser.
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Requested transport (e.g. multicast) is not implemented.
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// Duplicate session id or conflicting SETUP.
    #[error("conflict: {0}")]
    Conflict(String),

    /// UDP port pool exhausted its configured `[first, last]` range.
    #[error("port range exhausted")]
    PortRangeExhausted,

    /// Server::start called while already running, or before start.
    #[error("server lifecycle error: {0}")]
    Lifecycle(String),

    /// Pre-buffer producer terminated and the consumer caught up; a
    /// graceful condition, not a fault (spec §4.5/§4.6 "EndOfStream").
    #[error("end of stream")]
    EndOfStream,
}

/// Transport-layer failure, categorised per spec's loss-budget gate.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Write would have blocked; counted against the 5s loss budget.
    #[error("would block")]
    WouldBlock,
    /// Read/write timed out; the caller should re-poll.
    #[error("timed out")]
    Timeout,
    /// Unrecoverable socket error; aborts the owning RTP session.
    #[error("hard transport failure: {0}")]
    Hard(String),
}

impl StreamdError {
    /// RTSP status code this error should be reported as (spec §6/§7).
    pub fn status_code(&self) -> u16 {
        match self {
            StreamdError::NotFound(_) => 404,
            StreamdError::InvalidState(_) => 455,
            StreamdError::Protocol(_) => 400,
            StreamdError::UnsupportedCodec(_) => 415,
            StreamdError::UnsupportedTransport(_) => 461,
            StreamdError::Conflict(_) => 409,
            StreamdError::Io(_) | StreamdError::Transport(_) | StreamdError::Lifecycle(_) => 500,
            StreamdError::PortRangeExhausted => 453,
            StreamdError::OutOfBounds(_) => 200,
            StreamdError::EndOfStream => 200,
        }
    }

    pub fn session_not_found(id: impl Into<String>) -> Self {
        StreamdError::NotFound(format!("session {}", id.into()))
    }
}

/// Specific kind of RTSP parse failure, mirrored from the teacher so the
/// dispatcher can log a precise reason without allocating a new string.
#[derive(Debug)]
pub enum ParseErrorKind {
    EmptyRequest,
    InvalidRequestLine,
    InvalidHeader,
    UnsupportedVersion,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::UnsupportedVersion => write!(f, "unsupported RTSP version"),
        }
    }
}

impl From<ParseErrorKind> for StreamdError {
    fn from(kind: ParseErrorKind) -> Self {
        StreamdError::Protocol(kind.to_string())
    }
}

/// Convenience alias for `Result<T, StreamdError>`.
pub type Result<T> = std::result::Result<T, StreamdError>;
