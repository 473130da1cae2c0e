//! Cloneable sending half of the hub, held by every connection.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use relayhub_core::config::RealtimeConfig;
use relayhub_core::types::ConnectionId;

use crate::connection::Connection;
use crate::error::HubError;
use crate::message::Message;
use crate::metrics::HubMetrics;
use crate::transport::{CLOSE_TRY_AGAIN_LATER, CloseFrame};

/// Registration request, acknowledged once the dispatcher has decided.
#[derive(Debug)]
pub(crate) struct RegisterRequest {
    pub conn: Arc<Connection>,
    pub ack: oneshot::Sender<Result<(), HubError>>,
}

/// Unregistration request. The ack carries whether anything was removed.
#[derive(Debug)]
pub(crate) struct UnregisterRequest {
    pub id: ConnectionId,
    pub ack: oneshot::Sender<bool>,
}

/// Join or leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MembershipOp {
    Join,
    Leave,
}

/// Group membership change for one connection.
#[derive(Debug, Clone)]
pub(crate) struct MembershipChange {
    pub id: ConnectionId,
    pub group: String,
    pub op: MembershipOp,
}

/// Receiving halves, owned by the dispatcher.
#[derive(Debug)]
pub(crate) struct HubInbox {
    pub register: mpsc::Receiver<RegisterRequest>,
    pub unregister: mpsc::Receiver<UnregisterRequest>,
    pub membership: mpsc::Receiver<MembershipChange>,
    pub routed: mpsc::Receiver<Message>,
}

/// Sending side of the hub's request queues.
///
/// Cheap to clone. Every connection carries one so it can unregister itself,
/// report membership changes and forward routed messages without a
/// reference back to the [`Hub`](crate::Hub).
#[derive(Debug, Clone)]
pub struct HubHandle {
    pub(crate) config: Arc<RealtimeConfig>,
    pub(crate) metrics: Arc<HubMetrics>,
    register_tx: mpsc::Sender<RegisterRequest>,
    unregister_tx: mpsc::Sender<UnregisterRequest>,
    membership_tx: mpsc::Sender<MembershipChange>,
    routed_tx: mpsc::Sender<Message>,
}

impl HubHandle {
    /// Creates the request queues sized from `config`.
    pub(crate) fn channel(config: Arc<RealtimeConfig>, metrics: Arc<HubMetrics>) -> (Self, HubInbox) {
        let (register_tx, register) = mpsc::channel(config.register_buffer_size);
        let (unregister_tx, unregister) = mpsc::channel(config.register_buffer_size);
        let (membership_tx, membership) = mpsc::channel(config.register_buffer_size);
        let (routed_tx, routed) = mpsc::channel(config.broadcast_buffer_size);
        (
            Self {
                config,
                metrics,
                register_tx,
                unregister_tx,
                membership_tx,
                routed_tx,
            },
            HubInbox {
                register,
                unregister,
                membership,
                routed,
            },
        )
    }

    /// Hub configuration.
    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Registers a connection and waits for the dispatcher's verdict.
    ///
    /// A refused or failed registration force-closes the connection, so a
    /// subsequent `serve` winds down immediately.
    pub async fn register(&self, conn: Arc<Connection>) -> Result<(), HubError> {
        let (ack, verdict) = oneshot::channel();
        let request = RegisterRequest {
            conn: conn.clone(),
            ack,
        };
        let result = match self.register_tx.send(request).await {
            Ok(()) => verdict.await.unwrap_or(Err(HubError::HubClosed)),
            Err(_) => Err(HubError::HubClosed),
        };
        if let Err(ref err) = result {
            conn.force_close(CloseFrame::new(CLOSE_TRY_AGAIN_LATER, err.to_string()));
        }
        result
    }

    /// Removes a connection from every index. Idempotent.
    ///
    /// Returns whether the connection was still registered.
    pub async fn unregister(&self, id: ConnectionId) -> Result<bool, HubError> {
        let (ack, removed) = oneshot::channel();
        self.unregister_tx
            .send(UnregisterRequest { id, ack })
            .await
            .map_err(|_| HubError::HubClosed)?;
        removed.await.map_err(|_| HubError::HubClosed)
    }

    pub(crate) async fn update_membership(&self, change: MembershipChange) -> Result<(), HubError> {
        self.membership_tx
            .send(change)
            .await
            .map_err(|_| HubError::HubClosed)
    }

    /// Queues a routed message without waiting.
    ///
    /// Fails with [`HubError::ChannelFull`] when the broadcast queue is at
    /// capacity.
    pub fn route(&self, message: Message) -> Result<(), HubError> {
        self.routed_tx.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => HubError::ChannelFull("broadcast"),
            mpsc::error::TrySendError::Closed(_) => HubError::HubClosed,
        })
    }
}
