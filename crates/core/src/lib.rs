//! # streamd — concurrent RTSP/RTP/RTCP streaming server library
//!
//! A Rust library for serving pre-recorded and live media presentations
//! over the Real-Time Streaming Protocol (RTSP), with trick-mode
//! playback (PAUSE/seek/speed) and both UDP and TCP-interleaved RTP
//! delivery.
//!
//! ## Protocol references
//!
//! | RFC | Topic | How this crate uses it |
//! |-----|-------|----------------------|
//! | [RFC 2326](https://tools.ietf.org/html/rfc2326) | RTSP 1.0 | Request/response parsing, session lifecycle, transport negotiation |
//! | [RFC 3550](https://tools.ietf.org/html/rfc3550) | RTP/RTCP | Packet header format, SSRC generation, SR/RR reports |
//! | [RFC 4566](https://tools.ietf.org/html/rfc4566) | SDP | Session description generation for DESCRIBE responses |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  cli                                      │
//! ├──────────────────────────────────────────┤
//! │  Server        — accept loop, reaper      │
//! │  Runtime       — process-wide singletons  │
//! │  MountRegistry — descriptor cache         │
//! ├──────────────────────────────────────────┤
//! │  Protocol      — RTSP parsing, SDP, etc.  │
//! │  Session       — aggregate control, conn  │
//! ├──────────────────────────────────────────┤
//! │  Transport     — UDP / interleaved / ctrl │
//! │  Media         — demux, iterator, codecs  │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use streamd::Config;
//! use streamd::server::Server;
//!
//! let mut server = Server::new(Config::default());
//! server.start().unwrap();
//! ```
//!
//! ## Crate layout
//!
//! - [`server`] — High-level [`Server`] orchestrator: accept loop, connection cap, reaper.
//! - [`runtime`] — [`runtime::Runtime`]: process-wide config/port-pool/descriptor-cache bundle.
//! - [`mount`] — [`mount::Presentation`] and [`mount::MountRegistry`].
//! - [`protocol`] — RTSP request/response parsing, method handling, SDP generation.
//! - [`session`] — RTSP session state machine, per-connection read loop, transport negotiation.
//! - [`rtp_session`] — Per-track pacing loop and trick-mode state machine.
//! - [`rtcp`] — Sender/receiver reports.
//! - [`transport`] — UDP, TCP-interleaved, and control-channel [`transport::Channel`] implementations.
//! - [`media`] — Demux, frame iterator, packetisers.
//! - [`prebuffer`] — Trick-mode admission policy and read-ahead buffer.
//! - [`clock`] — Wall-time ↔ presentation-time mapping.
//! - [`error`] — [`StreamdError`] enum and [`Result`] alias.

pub mod clock;
pub mod config;
pub mod error;
pub mod media;
pub mod mount;
pub mod prebuffer;
pub mod protocol;
pub mod rtcp;
pub mod rtp_session;
pub mod runtime;
pub mod server;
pub mod session;
pub mod transport;

pub use config::Config;
pub use error::{Result, StreamdError};
pub use mount::{DEFAULT_MOUNT_PATH, MountRegistry, Presentation};
pub use server::Server;
