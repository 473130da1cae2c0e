//! Per-client connection state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{Notify, RwLock, mpsc};
use tokio_util::sync::CancellationToken;

use relayhub_core::types::ConnectionId;

use crate::error::HubError;
use crate::hub::handle::{HubHandle, MembershipChange, MembershipOp};
use crate::message::validator;
use crate::transport::CloseFrame;

use super::status::ConnectionStatus;

/// Receiving end of a connection's outbound queue, drained by its writer.
pub type Mailbox = mpsc::Receiver<Bytes>;

/// How an enqueue behaves when the mailbox is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendPolicy {
    /// Fail immediately.
    DropOnFull,
    /// Wait up to the given duration for room.
    BoundedWait(Duration),
}

/// Why an enqueue did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnqueueError {
    /// Mailbox at capacity.
    Full,
    /// Mailbox already closed.
    Closed,
}

/// Mutable per-connection fields, guarded by a single lock.
#[derive(Debug)]
struct ConnectionState {
    status: ConnectionStatus,
    last_ping: DateTime<Utc>,
    groups: HashSet<String>,
    metadata: Map<String, Value>,
}

/// A single client session on the hub.
///
/// Created by [`Connection::new`] together with its [`Mailbox`], registered
/// with the hub, then driven by [`Connection::serve`]. The mailbox sender is
/// owned here and closed exactly once, by the hub on unregister.
#[derive(Debug)]
pub struct Connection {
    /// Unique connection ID
    id: ConnectionId,
    /// User who owns this connection
    user_id: String,
    /// When the connection was created
    connected_at: DateTime<Utc>,
    /// Back-reference to the hub's request queues
    pub(crate) hub: HubHandle,
    /// Outbound queue; `None` once closed
    mailbox: RwLock<Option<mpsc::Sender<Bytes>>>,
    state: RwLock<ConnectionState>,
    /// Cleared on teardown
    alive: AtomicBool,
    /// Cancelled when either loop should stop
    pub(crate) closer: CancellationToken,
    /// Close status sent to the peer; first writer wins
    pub(crate) close_frame: OnceLock<CloseFrame>,
    /// Wakes the writer to send a ping under hub-driven pinging
    pub(crate) ping_signal: Notify,
}

impl Connection {
    /// Creates a connection in the `connected` state and its mailbox.
    pub fn new(user_id: impl Into<String>, hub: HubHandle) -> (Arc<Self>, Mailbox) {
        let (tx, rx) = mpsc::channel(hub.config.mailbox_size);
        let now = Utc::now();
        let conn = Arc::new(Self {
            id: ConnectionId::new(),
            user_id: user_id.into(),
            connected_at: now,
            hub,
            mailbox: RwLock::new(Some(tx)),
            state: RwLock::new(ConnectionState {
                status: ConnectionStatus::Connected,
                last_ping: now,
                groups: HashSet::new(),
                metadata: Map::new(),
            }),
            alive: AtomicBool::new(true),
            closer: CancellationToken::new(),
            close_frame: OnceLock::new(),
            ping_signal: Notify::new(),
        });
        (conn, rx)
    }

    /// Connection ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Owning user.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Creation time.
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Whether the connection is still serving traffic.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.closer.is_cancelled()
    }

    /// Whether teardown has started.
    pub fn is_closed(&self) -> bool {
        self.closer.is_cancelled()
    }

    pub(crate) fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Current lifecycle status.
    pub async fn status(&self) -> ConnectionStatus {
        self.state.read().await.status
    }

    /// Applies a status transition if the table allows it.
    pub(crate) async fn set_status(&self, next: ConnectionStatus) -> bool {
        let mut state = self.state.write().await;
        if state.status.can_transition_to(next) {
            state.status = next;
            true
        } else {
            false
        }
    }

    /// Time of the last inbound liveness signal.
    pub async fn last_ping(&self) -> DateTime<Utc> {
        self.state.read().await.last_ping
    }

    /// Refreshes the liveness timestamp.
    pub async fn touch(&self) {
        self.state.write().await.last_ping = Utc::now();
    }

    /// Groups this connection belongs to.
    pub async fn groups(&self) -> HashSet<String> {
        self.state.read().await.groups.clone()
    }

    /// Metadata set through `status` messages.
    pub async fn metadata(&self) -> Map<String, Value> {
        self.state.read().await.metadata.clone()
    }

    /// Merges entries into the metadata, returning the result.
    pub async fn merge_metadata(&self, entries: Map<String, Value>) -> Map<String, Value> {
        let mut state = self.state.write().await;
        state.metadata.extend(entries);
        state.metadata.clone()
    }

    /// Joins a group and tells the hub.
    pub async fn join_group(&self, group: &str) -> Result<(), HubError> {
        validator::validate_group_name(group)?;
        self.state.write().await.groups.insert(group.to_string());
        self.hub
            .update_membership(MembershipChange {
                id: self.id,
                group: group.to_string(),
                op: MembershipOp::Join,
            })
            .await
    }

    /// Leaves a group and tells the hub.
    pub async fn leave_group(&self, group: &str) -> Result<(), HubError> {
        validator::validate_group_name(group)?;
        self.state.write().await.groups.remove(group);
        self.hub
            .update_membership(MembershipChange {
                id: self.id,
                group: group.to_string(),
                op: MembershipOp::Leave,
            })
            .await
    }

    /// Starts teardown: both loops stop and the writer sends `frame`.
    ///
    /// Never blocks. Only the first close status is kept.
    pub fn force_close(&self, frame: CloseFrame) {
        self.mark_dead();
        let _ = self.close_frame.set(frame);
        self.closer.cancel();
    }

    /// Asks the writer to send a protocol ping now.
    pub(crate) fn request_ping(&self) {
        self.ping_signal.notify_one();
    }

    /// Pushes a serialized frame onto the mailbox.
    ///
    /// Under [`SendPolicy::DropOnFull`] this never awaits: a contended
    /// mailbox lock means the mailbox is being closed, which is reported as
    /// [`EnqueueError::Closed`].
    pub(crate) async fn enqueue(&self, payload: Bytes, policy: SendPolicy) -> Result<(), EnqueueError> {
        match policy {
            SendPolicy::DropOnFull => {
                let guard = self.mailbox.try_read().map_err(|_| EnqueueError::Closed)?;
                let tx = guard.as_ref().ok_or(EnqueueError::Closed)?;
                tx.try_send(payload).map_err(|err| match err {
                    mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
                    mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
                })
            }
            SendPolicy::BoundedWait(wait) => {
                let guard = self.mailbox.read().await;
                let tx = guard.as_ref().ok_or(EnqueueError::Closed)?;
                match tokio::time::timeout(wait, tx.send(payload)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => Err(EnqueueError::Closed),
                    Err(_) => Err(EnqueueError::Full),
                }
            }
        }
    }

    /// Closes the mailbox. Returns `false` if it was already closed.
    pub(crate) async fn close_mailbox(&self) -> bool {
        self.mailbox.write().await.take().is_some()
    }

    /// Serializable snapshot.
    pub async fn info(&self) -> ConnectionInfo {
        let state = self.state.read().await;
        let mut groups: Vec<String> = state.groups.iter().cloned().collect();
        groups.sort();
        ConnectionInfo {
            id: self.id,
            user_id: self.user_id.clone(),
            status: state.status,
            connected_at: self.connected_at,
            last_ping: state.last_ping,
            groups,
            metadata: state.metadata.clone(),
            alive: self.is_alive(),
        }
    }

    #[cfg(test)]
    pub(crate) async fn backdate_last_ping(&self, by: chrono::Duration) {
        self.state.write().await.last_ping -= by;
    }
}

/// Snapshot of connection info (serializable)
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    /// Connection ID
    pub id: ConnectionId,
    /// User ID
    pub user_id: String,
    /// Lifecycle status
    pub status: ConnectionStatus,
    /// Connected at
    pub connected_at: DateTime<Utc>,
    /// Last liveness signal
    pub last_ping: DateTime<Utc>,
    /// Groups, sorted
    pub groups: Vec<String>,
    /// Client-set metadata
    pub metadata: Map<String, Value>,
    /// Is alive
    pub alive: bool,
}
