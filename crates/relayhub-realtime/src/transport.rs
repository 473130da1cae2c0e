//! Transport-neutral frame model for a duplex socket.
//!
//! The hub never touches a concrete WebSocket type. The HTTP layer adapts
//! its socket halves into a `Stream<Item = Result<Frame, E>>` and a
//! `Sink<Frame>` and hands them to [`Connection::serve`](crate::Connection::serve).

use bytes::Bytes;
use thiserror::Error;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away (server shutdown, heartbeat timeout).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Policy violation (slow consumer under close-on-backpressure).
pub const CLOSE_POLICY: u16 = 1008;
/// Server overloaded, retry later (connection limit).
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// A single frame on the duplex socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame (JSON envelopes travel here).
    Text(Bytes),
    /// Binary frame.
    Binary(Bytes),
    /// Protocol-level ping.
    Ping(Bytes),
    /// Protocol-level pong.
    Pong(Bytes),
    /// Close frame with an optional status.
    Close(Option<CloseFrame>),
}

/// Close status carried by a [`Frame::Close`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// RFC 6455 close code.
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
}

impl CloseFrame {
    /// Creates a close status.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Whether the peer closed deliberately and cleanly.
    pub fn is_graceful(&self) -> bool {
        matches!(self.code, CLOSE_NORMAL | CLOSE_GOING_AWAY)
    }
}

/// Error surfaced by a socket adapter.
#[derive(Debug, Clone, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    /// Wraps any displayable transport failure.
    pub fn new(err: impl std::fmt::Display) -> Self {
        Self(err.to_string())
    }
}
