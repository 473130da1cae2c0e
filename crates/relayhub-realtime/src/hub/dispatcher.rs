//! The hub's single-writer event loop.
//!
//! Registrations, unregistrations, membership changes, routed messages and
//! the heartbeat sweep are all serialized through one task, which is the
//! only writer of the registry while the hub runs.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::connection::Connection;
use crate::connection::heartbeat;
use crate::error::HubError;
use crate::message::Message;
use crate::transport::{CLOSE_GOING_AWAY, CLOSE_TRY_AGAIN_LATER, CloseFrame};
use crate::workers::{BroadcastJob, PingJob};

use super::HubShared;
use super::delivery;
use super::handle::{HubInbox, MembershipChange, MembershipOp, RegisterRequest};

pub(crate) struct Dispatcher {
    shared: Arc<HubShared>,
    inbox: HubInbox,
    broadcast_jobs: mpsc::Sender<BroadcastJob>,
    ping_jobs: Option<mpsc::Sender<PingJob>>,
}

impl Dispatcher {
    pub(crate) fn new(
        shared: Arc<HubShared>,
        inbox: HubInbox,
        broadcast_jobs: mpsc::Sender<BroadcastJob>,
        ping_jobs: Option<mpsc::Sender<PingJob>>,
    ) -> Self {
        Self {
            shared,
            inbox,
            broadcast_jobs,
            ping_jobs,
        }
    }

    /// Runs until the hub's cancellation token fires.
    ///
    /// Dropping `self` on return closes the job queues, which stops the
    /// worker pools.
    pub(crate) async fn run(mut self) {
        let period = self.shared.config.heartbeat_interval();
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let cancel = self.shared.cancel.clone();

        info!("Hub dispatcher started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(request) = self.inbox.register.recv() => self.register(request).await,
                Some(request) = self.inbox.unregister.recv() => {
                    let removed = self.shared.unregister_connection(request.id).await;
                    let _ = request.ack.send(removed);
                }
                Some(change) = self.inbox.membership.recv() => self.apply_membership(change),
                Some(message) = self.inbox.routed.recv() => self.dispatch(message).await,
                _ = heartbeat.tick() => self.heartbeat(Utc::now()).await,
            }
        }

        info!("Hub dispatcher stopped");
    }

    async fn register(&self, request: RegisterRequest) {
        let RegisterRequest { conn, ack } = request;
        let registry = &self.shared.registry;

        if registry.contains(&conn.id()) {
            let _ = ack.send(Ok(()));
            return;
        }

        let limit = self.shared.config.max_connections;
        if registry.len() >= limit {
            warn!(
                conn_id = %conn.id(),
                user_id = %conn.user_id(),
                limit,
                "Connection limit reached, refusing connection"
            );
            self.shared.metrics.connection_rejected();
            conn.force_close(CloseFrame::new(CLOSE_TRY_AGAIN_LATER, "connection limit reached"));
            let _ = ack.send(Err(HubError::ConnectionLimitExceeded { limit }));
            return;
        }

        let groups = conn.groups().await;
        registry.insert(conn.clone(), groups).await;
        self.shared.metrics.connection_opened();

        info!(
            conn_id = %conn.id(),
            user_id = %conn.user_id(),
            total = registry.len(),
            "Connection registered"
        );

        let _ = ack.send(Ok(()));
    }

    fn apply_membership(&self, change: MembershipChange) {
        let applied = match change.op {
            MembershipOp::Join => self.shared.registry.join(&change.id, &change.group),
            MembershipOp::Leave => self.shared.registry.leave(&change.id, &change.group),
        };
        if !applied {
            debug!(conn_id = %change.id, group = %change.group, "Membership change for unknown connection ignored");
        }
    }

    /// Routes by precedence: user, then group, then everyone.
    async fn dispatch(&self, message: Message) {
        let payload = match message.to_bytes() {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, kind = %message.kind, "Failed to serialize routed message");
                return;
            }
        };

        if let Some(user_id) = message.target_user() {
            let targets = self.shared.registry.user_members(user_id);
            if targets.is_empty() {
                debug!(user_id = %user_id, "No connections for user");
            }
            deliver(&targets, &payload).await;
        } else if let Some(group) = message.target_group() {
            let targets = self.shared.registry.group_members(group);
            if targets.is_empty() {
                debug!(group = %group, "No members in group");
            }
            deliver(&targets, &payload).await;
        } else {
            self.enqueue_broadcast(payload);
        }
    }

    /// Splits a broadcast-to-all into one job per shard.
    ///
    /// Never blocks: a full job queue sheds that shard's job.
    fn enqueue_broadcast(&self, payload: Bytes) {
        for shard in 0..self.shared.registry.shards().len() {
            let job = BroadcastJob {
                shard,
                payload: payload.clone(),
            };
            match self.broadcast_jobs.try_send(job) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(job)) => {
                    self.shared.metrics.broadcast_job_dropped();
                    warn!(shard = job.shard, "Broadcast job queue full, dropping job");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Broadcast workers stopped, dropping broadcast");
                    return;
                }
            }
        }
    }

    async fn heartbeat(&self, now: DateTime<Utc>) {
        let timeout = self.shared.config.connection_timeout();
        let stale = heartbeat::find_stale(self.shared.registry.all(), now, timeout).await;

        for conn in stale {
            warn!(
                conn_id = %conn.id(),
                user_id = %conn.user_id(),
                error = %HubError::HeartbeatTimeout(conn.id()),
                "Closing stale connection"
            );
            self.shared.metrics.heartbeat_timeout();
            conn.force_close(CloseFrame::new(CLOSE_GOING_AWAY, "heartbeat timeout"));
            self.shared.unregister_connection(conn.id()).await;
        }

        if let Some(ping_jobs) = &self.ping_jobs {
            for shard in 0..self.shared.registry.shards().len() {
                if ping_jobs.try_send(PingJob { shard }).is_err() {
                    debug!(shard, "Ping job queue full, skipping shard this round");
                }
            }
        }
    }
}

/// Delivers an addressed message inline on the dispatcher.
///
/// Under the bounded-wait policy each full mailbox can hold the loop for up
/// to `send_timeout`, so a message to N slow members delays later requests
/// by at most N times that. Members behind a slow one still receive it.
async fn deliver(targets: &[Arc<Connection>], payload: &Bytes) {
    for conn in targets {
        delivery::try_send(conn, payload.clone(), |conn| {
            debug!(conn_id = %conn.id(), "Routed message not delivered");
        })
        .await;
    }
}
