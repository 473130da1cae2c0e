//! Message discriminators and the typed payload union.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::HubError;

/// Closed set of wire `type` discriminators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Application-level liveness check from the client.
    Ping,
    /// Reply to [`MessageType::Ping`].
    Pong,
    /// Request to join a group.
    JoinGroup,
    /// Confirmation of [`MessageType::JoinGroup`].
    GroupJoined,
    /// Request to leave a group.
    LeaveGroup,
    /// Confirmation of [`MessageType::LeaveGroup`].
    GroupLeft,
    /// Addressed chat message.
    Chat,
    /// Addressed notification.
    Notification,
    /// Connection metadata update.
    Status,
    /// Confirmation of [`MessageType::Status`].
    StatusUpdated,
    /// Error report.
    Error,
    /// Generic success report.
    Success,
}

impl MessageType {
    /// Wire name of the discriminator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::JoinGroup => "join_group",
            Self::GroupJoined => "group_joined",
            Self::LeaveGroup => "leave_group",
            Self::GroupLeft => "group_left",
            Self::Chat => "chat",
            Self::Notification => "notification",
            Self::Status => "status",
            Self::StatusUpdated => "status_updated",
            Self::Error => "error",
            Self::Success => "success",
        }
    }

    /// Whether clients may send this type to the server.
    pub fn is_client_request(&self) -> bool {
        matches!(
            self,
            Self::Ping
                | Self::Pong
                | Self::JoinGroup
                | Self::LeaveGroup
                | Self::Chat
                | Self::Notification
                | Self::Status
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ping" => Ok(Self::Ping),
            "pong" => Ok(Self::Pong),
            "join_group" => Ok(Self::JoinGroup),
            "group_joined" => Ok(Self::GroupJoined),
            "leave_group" => Ok(Self::LeaveGroup),
            "group_left" => Ok(Self::GroupLeft),
            "chat" => Ok(Self::Chat),
            "notification" => Ok(Self::Notification),
            "status" => Ok(Self::Status),
            "status_updated" => Ok(Self::StatusUpdated),
            "error" => Ok(Self::Error),
            "success" => Ok(Self::Success),
            other => Err(HubError::InvalidMessageType(other.to_string())),
        }
    }
}

/// Typed view of a message's `data`, one variant per discriminator.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No payload.
    Ping,
    /// No payload.
    Pong,
    /// Group name.
    JoinGroup(String),
    /// Group name.
    GroupJoined(String),
    /// Group name.
    LeaveGroup(String),
    /// Group name.
    GroupLeft(String),
    /// Structured body.
    Chat(Map<String, Value>),
    /// Structured body.
    Notification(Map<String, Value>),
    /// Metadata entries to merge.
    Status(Map<String, Value>),
    /// Metadata after the merge.
    StatusUpdated(Map<String, Value>),
    /// Error description.
    Error(String),
    /// Success description.
    Success(String),
}

impl Payload {
    /// Discriminator of this payload.
    pub fn kind(&self) -> MessageType {
        match self {
            Self::Ping => MessageType::Ping,
            Self::Pong => MessageType::Pong,
            Self::JoinGroup(_) => MessageType::JoinGroup,
            Self::GroupJoined(_) => MessageType::GroupJoined,
            Self::LeaveGroup(_) => MessageType::LeaveGroup,
            Self::GroupLeft(_) => MessageType::GroupLeft,
            Self::Chat(_) => MessageType::Chat,
            Self::Notification(_) => MessageType::Notification,
            Self::Status(_) => MessageType::Status,
            Self::StatusUpdated(_) => MessageType::StatusUpdated,
            Self::Error(_) => MessageType::Error,
            Self::Success(_) => MessageType::Success,
        }
    }

    /// Decodes `data` into the variant selected by `kind`.
    ///
    /// Ping and pong ignore their data. All other variants reject a
    /// payload of the wrong JSON shape with [`HubError::InvalidMessageData`].
    pub fn decode(kind: MessageType, data: Value) -> Result<Self, HubError> {
        match kind {
            MessageType::Ping => Ok(Self::Ping),
            MessageType::Pong => Ok(Self::Pong),
            MessageType::JoinGroup => expect_string(kind, data).map(Self::JoinGroup),
            MessageType::GroupJoined => expect_string(kind, data).map(Self::GroupJoined),
            MessageType::LeaveGroup => expect_string(kind, data).map(Self::LeaveGroup),
            MessageType::GroupLeft => expect_string(kind, data).map(Self::GroupLeft),
            MessageType::Chat => expect_object(kind, data).map(Self::Chat),
            MessageType::Notification => expect_object(kind, data).map(Self::Notification),
            MessageType::Status => expect_object(kind, data).map(Self::Status),
            MessageType::StatusUpdated => expect_object(kind, data).map(Self::StatusUpdated),
            MessageType::Error => expect_string(kind, data).map(Self::Error),
            MessageType::Success => expect_string(kind, data).map(Self::Success),
        }
    }

    /// Converts the payload back into its JSON `data` value.
    pub fn into_data(self) -> Value {
        match self {
            Self::Ping | Self::Pong => Value::Null,
            Self::JoinGroup(s)
            | Self::GroupJoined(s)
            | Self::LeaveGroup(s)
            | Self::GroupLeft(s)
            | Self::Error(s)
            | Self::Success(s) => Value::String(s),
            Self::Chat(m) | Self::Notification(m) | Self::Status(m) | Self::StatusUpdated(m) => {
                Value::Object(m)
            }
        }
    }
}

fn expect_string(kind: MessageType, data: Value) -> Result<String, HubError> {
    match data {
        Value::String(s) => Ok(s),
        _ => Err(HubError::InvalidMessageData(format!(
            "{kind} payload must be a string"
        ))),
    }
}

fn expect_object(kind: MessageType, data: Value) -> Result<Map<String, Value>, HubError> {
    match data {
        Value::Object(m) => Ok(m),
        _ => Err(HubError::InvalidMessageData(format!(
            "{kind} payload must be an object"
        ))),
    }
}
