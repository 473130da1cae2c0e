//! Wire envelope shared by both directions of the socket.

use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HubError;

use super::types::{MessageType, Payload};

/// JSON envelope: `{type, data, timestamp, from?, to?, group?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Discriminator.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Payload whose shape depends on `kind`.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: i64,
    /// Sender user ID, stamped by the server on forwarded messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Recipient user ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Recipient group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// Envelope with an unchecked discriminator, so that an unknown `type`
/// surfaces as [`HubError::InvalidMessageType`] rather than a parse error.
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    group: Option<String>,
}

impl Message {
    /// Creates an unaddressed message stamped with the current time.
    pub fn new(kind: MessageType, data: Value) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now().timestamp(),
            from: None,
            to: None,
            group: None,
        }
    }

    /// Creates a message from a typed payload.
    pub fn from_payload(payload: Payload) -> Self {
        let kind = payload.kind();
        Self::new(kind, payload.into_data())
    }

    /// Addresses the message to a user.
    pub fn to_user(mut self, user_id: impl Into<String>) -> Self {
        self.to = Some(user_id.into());
        self
    }

    /// Addresses the message to a group.
    pub fn to_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Decodes an inbound frame.
    ///
    /// Malformed JSON or a missing `type` yields
    /// [`HubError::InvalidMessageData`]; an unrecognized `type` yields
    /// [`HubError::InvalidMessageType`].
    pub fn decode(raw: &[u8]) -> Result<Self, HubError> {
        let raw: RawMessage = serde_json::from_slice(raw)
            .map_err(|e| HubError::InvalidMessageData(format!("malformed message: {e}")))?;
        let kind: MessageType = raw.kind.parse()?;
        Ok(Self {
            kind,
            data: raw.data,
            timestamp: raw.timestamp,
            from: raw.from,
            to: raw.to,
            group: raw.group,
        })
    }

    /// Typed view of `data`.
    pub fn payload(&self) -> Result<Payload, HubError> {
        Payload::decode(self.kind, self.data.clone())
    }

    /// Serializes the message into the bytes pushed onto mailboxes.
    pub fn to_bytes(&self) -> Result<Bytes, HubError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Recipient user, if a non-empty one is set.
    pub fn target_user(&self) -> Option<&str> {
        self.to.as_deref().filter(|s| !s.is_empty())
    }

    /// Recipient group, if a non-empty one is set.
    pub fn target_group(&self) -> Option<&str> {
        self.group.as_deref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_unknown_type_is_invalid_type() {
        let err = Message::decode(br#"{"type":"teleport","data":1}"#).unwrap_err();
        assert_eq!(err, HubError::InvalidMessageType("teleport".to_string()));
    }

    #[test]
    fn test_decode_garbage_is_invalid_data() {
        assert!(matches!(
            Message::decode(b"not json"),
            Err(HubError::InvalidMessageData(_))
        ));
        assert!(matches!(
            Message::decode(br#"{"data":"no type"}"#),
            Err(HubError::InvalidMessageData(_))
        ));
    }

    #[test]
    fn test_decode_addressing() {
        let msg = Message::decode(
            br#"{"type":"chat","data":{"text":"hi"},"to":"u2","timestamp":42}"#,
        )
        .unwrap();
        assert_eq!(msg.kind, MessageType::Chat);
        assert_eq!(msg.target_user(), Some("u2"));
        assert_eq!(msg.target_group(), None);
        assert_eq!(msg.timestamp, 42);
    }

    #[test]
    fn test_empty_addresses_are_ignored() {
        let msg = Message::new(MessageType::Chat, json!({})).to_user("").to_group("");
        assert_eq!(msg.target_user(), None);
        assert_eq!(msg.target_group(), None);
    }

    #[test]
    fn test_serialization_omits_absent_fields() {
        let msg = Message::from_payload(Payload::Pong);
        let value: Value = serde_json::from_slice(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(value["type"], "pong");
        assert!(value.get("data").is_none());
        assert!(value.get("to").is_none());
        assert!(value["timestamp"].as_i64().unwrap() > 0);
    }
}
