//! Client request handling: decode, dispatch by type, reply.

use chrono::Utc;
use tracing::{debug, error};

use crate::error::HubError;
use crate::hub::delivery;
use crate::message::types::Payload;
use crate::message::{Message, builder, validator};

use super::handle::Connection;

impl Connection {
    /// Processes one inbound text or binary frame.
    ///
    /// Failures are reported back to the client as `error` frames and never
    /// end the connection.
    pub(crate) async fn handle_inbound(&self, raw: &[u8]) {
        if let Err(err) = validator::validate_inbound(raw, self.hub.config.max_message_size) {
            self.reply(builder::error_from(&err)).await;
            return;
        }

        let message = match Message::decode(raw) {
            Ok(m) => m,
            Err(err) => {
                debug!(conn_id = %self.id(), error = %err, "Rejected inbound message");
                self.reply(builder::error_from(&err)).await;
                return;
            }
        };

        self.hub.metrics.message_received();

        if let Err(err) = self.handle_request(message).await {
            debug!(conn_id = %self.id(), error = %err, "Inbound request failed");
            self.reply(builder::error_from(&err)).await;
        }
    }

    async fn handle_request(&self, message: Message) -> Result<(), HubError> {
        if !message.kind.is_client_request() {
            return Err(HubError::InvalidMessageType(format!(
                "{} is not accepted from clients",
                message.kind
            )));
        }

        match message.payload()? {
            Payload::Ping => {
                self.touch().await;
                self.reply(builder::pong()).await;
            }
            Payload::Pong => self.touch().await,
            Payload::JoinGroup(group) => {
                self.join_group(&group).await?;
                debug!(conn_id = %self.id(), group = %group, "Joined group");
                self.reply(builder::group_joined(&group)).await;
            }
            Payload::LeaveGroup(group) => {
                self.leave_group(&group).await?;
                debug!(conn_id = %self.id(), group = %group, "Left group");
                self.reply(builder::group_left(&group)).await;
            }
            Payload::Chat(_) | Payload::Notification(_) => self.forward(message)?,
            Payload::Status(entries) => {
                let merged = self.merge_metadata(entries).await;
                self.reply(builder::status_updated(merged)).await;
            }
            Payload::GroupJoined(_)
            | Payload::GroupLeft(_)
            | Payload::StatusUpdated(_)
            | Payload::Error(_)
            | Payload::Success(_) => {
                return Err(HubError::InvalidMessageType(format!(
                    "{} is not accepted from clients",
                    message.kind
                )));
            }
        }

        Ok(())
    }

    /// Stamps the sender and hands an addressed message to the hub.
    fn forward(&self, mut message: Message) -> Result<(), HubError> {
        if message.target_user().is_none() && message.target_group().is_none() {
            return Err(HubError::InvalidMessageData(format!(
                "{} requires a `to` or `group` recipient",
                message.kind
            )));
        }

        message.from = Some(self.user_id().to_string());
        if message.timestamp == 0 {
            message.timestamp = Utc::now().timestamp();
        }

        self.hub.route(message)
    }

    /// Sends a reply to this connection through the hub's backpressure path.
    async fn reply(&self, message: Message) {
        let payload = match message.to_bytes() {
            Ok(p) => p,
            Err(e) => {
                error!(conn_id = %self.id(), error = %e, "Failed to serialize reply");
                return;
            }
        };

        delivery::try_send(self, payload, |conn| {
            debug!(conn_id = %conn.id(), kind = %message.kind, "Reply not delivered");
        })
        .await;
    }
}
