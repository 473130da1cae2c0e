//! Builders for server-originated reply frames.

use serde_json::{Map, Value};

use crate::error::HubError;

use super::envelope::Message;
use super::types::Payload;

/// `pong` reply to a client `ping`.
pub fn pong() -> Message {
    Message::from_payload(Payload::Pong)
}

/// Confirmation that the connection joined `group`.
pub fn group_joined(group: &str) -> Message {
    Message::from_payload(Payload::GroupJoined(group.to_string())).to_group(group)
}

/// Confirmation that the connection left `group`.
pub fn group_left(group: &str) -> Message {
    Message::from_payload(Payload::GroupLeft(group.to_string())).to_group(group)
}

/// Confirmation of a metadata merge, carrying the resulting metadata.
pub fn status_updated(metadata: Map<String, Value>) -> Message {
    Message::from_payload(Payload::StatusUpdated(metadata))
}

/// Structured error frame.
pub fn error(message: impl Into<String>) -> Message {
    Message::from_payload(Payload::Error(message.into()))
}

/// Error frame describing a [`HubError`].
pub fn error_from(err: &HubError) -> Message {
    error(err.to_string())
}
