//! Hub error taxonomy.

use thiserror::Error;

use relayhub_core::error::{AppError, ErrorKind};
use relayhub_core::types::ConnectionId;

/// Errors raised by the hub and its connections.
///
/// Every variant is scoped to a single connection or a single request;
/// none of them stops the dispatcher or the worker pools.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// Registration refused because the hub is at capacity.
    #[error("connection limit of {limit} reached")]
    ConnectionLimitExceeded {
        /// Configured `max_connections`.
        limit: usize,
    },
    /// Inbound frame carried a `type` the server does not accept.
    #[error("invalid message type: {0}")]
    InvalidMessageType(String),
    /// Inbound frame was malformed or its payload had the wrong shape.
    #[error("invalid message data: {0}")]
    InvalidMessageData(String),
    /// A connection's mailbox was full and the message was dropped.
    #[error("send buffer full for connection {0}")]
    SendBufferFull(ConnectionId),
    /// A connection missed its heartbeat deadline.
    #[error("heartbeat timeout for connection {0}")]
    HeartbeatTimeout(ConnectionId),
    /// An internal request channel was full.
    #[error("{0} channel is full")]
    ChannelFull(&'static str),
    /// The hub has been shut down.
    #[error("hub is closed")]
    HubClosed,
    /// No live connection with this ID.
    #[error("connection {0} not found")]
    ConnectionNotFound(ConnectionId),
    /// A message could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<HubError> for AppError {
    fn from(err: HubError) -> Self {
        let kind = match &err {
            HubError::ConnectionLimitExceeded { .. } => ErrorKind::RateLimit,
            HubError::InvalidMessageType(_) | HubError::InvalidMessageData(_) => {
                ErrorKind::Validation
            }
            HubError::SendBufferFull(_) | HubError::ChannelFull(_) | HubError::HubClosed => {
                ErrorKind::ServiceUnavailable
            }
            HubError::HeartbeatTimeout(_) => ErrorKind::Internal,
            HubError::ConnectionNotFound(_) => ErrorKind::NotFound,
            HubError::Serialization(_) => ErrorKind::Serialization,
        };
        AppError::new(kind, err.to_string())
    }
}
