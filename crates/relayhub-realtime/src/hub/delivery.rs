//! The single mailbox-send path shared by dispatcher, workers and replies.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::connection::handle::{EnqueueError, SendPolicy};
use crate::error::HubError;
use crate::transport::{CLOSE_POLICY, CloseFrame};

/// What happened to one attempted delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Enqueued on the mailbox.
    Delivered,
    /// Dropped because the mailbox stayed full.
    Dropped,
    /// The mailbox was already closed.
    Closed,
}

/// Enqueues `payload` on `conn`'s mailbox under the configured backpressure
/// policy.
///
/// Under drop-on-full this never blocks. Otherwise it waits at most
/// `send_timeout`. On failure `on_drop` runs with the connection; a full
/// mailbox additionally force-closes the connection when
/// `close_on_backpressure` is set.
pub async fn try_send<F>(conn: &Connection, payload: Bytes, on_drop: F) -> SendOutcome
where
    F: FnOnce(&Connection),
{
    let config = &conn.hub.config;
    let metrics = &conn.hub.metrics;
    let policy = if config.drop_on_full {
        SendPolicy::DropOnFull
    } else {
        SendPolicy::BoundedWait(config.send_timeout())
    };

    match conn.enqueue(payload, policy).await {
        Ok(()) => {
            metrics.message_sent();
            SendOutcome::Delivered
        }
        Err(EnqueueError::Full) => {
            metrics.message_dropped();
            warn!(
                conn_id = %conn.id(),
                user_id = %conn.user_id(),
                error = %HubError::SendBufferFull(conn.id()),
                "Dropping outbound message"
            );
            on_drop(conn);
            if config.close_on_backpressure {
                conn.force_close(CloseFrame::new(CLOSE_POLICY, "send buffer full"));
            }
            SendOutcome::Dropped
        }
        Err(EnqueueError::Closed) => {
            debug!(conn_id = %conn.id(), "Mailbox closed, message discarded");
            on_drop(conn);
            SendOutcome::Closed
        }
    }
}
