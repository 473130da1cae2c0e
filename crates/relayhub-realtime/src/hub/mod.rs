//! The hub: owns the registry, runs the dispatcher and worker pools, and
//! exposes the management API.

pub(crate) mod delivery;
pub(crate) mod dispatcher;
pub mod handle;
pub mod registry;

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relayhub_core::config::RealtimeConfig;
use relayhub_core::error::AppError;
use relayhub_core::types::ConnectionId;

use crate::connection::{Connection, ConnectionStatus, Mailbox};
use crate::error::HubError;
use crate::message::Message;
use crate::metrics::{HubMetrics, HubStats};
use crate::transport::{CLOSE_GOING_AWAY, CLOSE_NORMAL, CloseFrame};
use crate::workers;

pub use delivery::SendOutcome;
pub use handle::HubHandle;
pub use registry::Registry;

use dispatcher::Dispatcher;

/// State shared between the hub's public handle and its background tasks.
#[derive(Debug)]
pub(crate) struct HubShared {
    pub(crate) config: Arc<RealtimeConfig>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) metrics: Arc<HubMetrics>,
    handle: HubHandle,
    pub(crate) cancel: CancellationToken,
    /// Dispatcher first, then workers.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl HubShared {
    /// Removes a connection from every index, marks it disconnected and
    /// closes its mailbox. Idempotent.
    pub(crate) async fn unregister_connection(&self, id: ConnectionId) -> bool {
        let Some(conn) = self.registry.remove(&id).await else {
            return false;
        };

        conn.mark_dead();
        conn.set_status(ConnectionStatus::Disconnected).await;
        conn.close_mailbox().await;
        self.metrics.connection_closed();

        info!(
            conn_id = %id,
            user_id = %conn.user_id(),
            total = self.registry.len(),
            "Connection unregistered"
        );
        true
    }
}

/// Real-time connection hub.
///
/// Cheap to clone; all clones share one dispatcher. Must be created inside
/// a tokio runtime and should be torn down with [`Hub::close`].
#[derive(Debug, Clone)]
pub struct Hub {
    shared: Arc<HubShared>,
}

impl Hub {
    /// Validates `config`, then starts the dispatcher and worker pools.
    pub fn new(config: RealtimeConfig) -> Result<Self, AppError> {
        config.validate()?;

        if config.cluster_mode {
            warn!("Cluster mode requested but not supported; running as a single node");
        }

        let config = Arc::new(config);
        let metrics = Arc::new(HubMetrics::new());
        let registry = Arc::new(Registry::new(config.shard_count));
        let (handle, inbox) = HubHandle::channel(config.clone(), metrics.clone());

        let (broadcast_tx, broadcast_rx) = mpsc::channel(config.broadcast_queue_size);
        let mut tasks = Vec::new();
        let mut worker_tasks = workers::spawn_broadcast_workers(
            registry.clone(),
            broadcast_rx,
            config.broadcast_worker_count,
        );

        let ping_tx = if config.enable_global_ping {
            let (ping_tx, ping_rx) = mpsc::channel(config.shard_count);
            worker_tasks.extend(workers::spawn_ping_workers(
                registry.clone(),
                ping_rx,
                config.ping_worker_count,
            ));
            Some(ping_tx)
        } else {
            None
        };

        let shared = Arc::new(HubShared {
            config: config.clone(),
            registry,
            metrics,
            handle,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        });

        let dispatcher = Dispatcher::new(shared.clone(), inbox, broadcast_tx, ping_tx);
        tasks.push(tokio::spawn(dispatcher.run()));
        tasks.extend(worker_tasks);
        *shared.tasks.lock().unwrap_or_else(PoisonError::into_inner) = tasks;

        info!(
            shards = config.shard_count,
            broadcast_workers = config.broadcast_worker_count,
            global_ping = config.enable_global_ping,
            max_connections = config.max_connections,
            "Hub started"
        );

        Ok(Self { shared })
    }

    /// Sending handle for connections.
    pub fn handle(&self) -> HubHandle {
        self.shared.handle.clone()
    }

    /// Active configuration.
    pub fn config(&self) -> &RealtimeConfig {
        &self.shared.config
    }

    /// Creates a connection bound to this hub. It still has to be registered.
    pub fn connect(&self, user_id: impl Into<String>) -> (Arc<Connection>, Mailbox) {
        Connection::new(user_id, self.handle())
    }

    /// Registers a connection. See [`HubHandle::register`].
    pub async fn register(&self, conn: Arc<Connection>) -> Result<(), HubError> {
        self.shared.handle.register(conn).await
    }

    /// Unregisters a connection. See [`HubHandle::unregister`].
    pub async fn unregister(&self, id: ConnectionId) -> Result<bool, HubError> {
        self.shared.handle.unregister(id).await
    }

    /// Live connection count.
    pub fn connection_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Connections held by a user.
    pub fn user_connection_count(&self, user_id: &str) -> usize {
        self.shared.registry.user_count(user_id)
    }

    /// Connections in a group.
    pub fn group_connection_count(&self, group: &str) -> usize {
        self.shared.registry.group_count(group)
    }

    /// Queues `message` for every connection of `user_id`.
    pub fn send_to_user(&self, user_id: &str, mut message: Message) -> Result<(), HubError> {
        if user_id.is_empty() {
            return Err(HubError::InvalidMessageData(
                "recipient user must not be empty".to_string(),
            ));
        }
        message.to = Some(user_id.to_string());
        message.group = None;
        self.shared.handle.route(message)
    }

    /// Queues `message` for every member of `group`.
    pub fn broadcast_to_group(&self, group: &str, mut message: Message) -> Result<(), HubError> {
        if group.is_empty() {
            return Err(HubError::InvalidMessageData(
                "recipient group must not be empty".to_string(),
            ));
        }
        message.to = None;
        message.group = Some(group.to_string());
        self.shared.handle.route(message)
    }

    /// Queues `message` for every live connection.
    pub fn broadcast_to_all(&self, mut message: Message) -> Result<(), HubError> {
        message.to = None;
        message.group = None;
        self.shared.handle.route(message)
    }

    /// Looks up a live connection.
    pub fn get_connection(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.shared.registry.get(id)
    }

    /// Whether `id` is registered and still serving traffic.
    pub fn is_connection_alive(&self, id: &ConnectionId) -> bool {
        self.get_connection(id).is_some_and(|conn| conn.is_alive())
    }

    /// Closes a connection from the server side.
    pub async fn disconnect(&self, id: ConnectionId) -> Result<(), HubError> {
        let conn = self
            .get_connection(&id)
            .ok_or(HubError::ConnectionNotFound(id))?;
        info!(conn_id = %id, user_id = %conn.user_id(), "Disconnecting connection");
        conn.force_close(CloseFrame::new(CLOSE_NORMAL, "disconnected by server"));
        self.unregister(id).await?;
        Ok(())
    }

    /// Point-in-time statistics.
    pub async fn stats(&self) -> HubStats {
        let registry = &self.shared.registry;
        HubStats {
            connections: registry.len(),
            users: registry.distinct_users(),
            groups: registry.distinct_groups(),
            shard_count: registry.shards().len(),
            shard_sizes: registry.shards().sizes().await,
            counters: self.shared.metrics.snapshot(),
        }
    }

    /// Whether [`Hub::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Stops the dispatcher and workers and closes every connection.
    ///
    /// Idempotent. Afterwards the connection count is zero and every hub
    /// operation fails with [`HubError::HubClosed`]. A repeated call still
    /// closes connections left behind by an earlier call that was dropped
    /// before it finished.
    pub async fn close(&self) {
        let tasks = std::mem::take(
            &mut *self
                .shared
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        self.shared.cancel.cancel();

        let mut tasks = tasks.into_iter();
        if let Some(dispatcher) = tasks.next() {
            info!("Shutting down hub");
            if let Err(e) = dispatcher.await {
                warn!(error = %e, "Dispatcher task failed");
            }
        }

        let closed = self.close_remaining().await;

        for worker in tasks {
            if let Err(e) = worker.await {
                debug!(error = %e, "Worker task failed");
            }
        }

        if closed > 0 {
            info!(closed, "Hub shut down");
        }
    }

    /// Force-closes and unregisters every connection still in the registry.
    async fn close_remaining(&self) -> usize {
        let remaining = self.shared.registry.all();
        for conn in &remaining {
            conn.force_close(CloseFrame::new(CLOSE_GOING_AWAY, "server shutting down"));
            self.shared.unregister_connection(conn.id()).await;
        }
        remaining.len()
    }
}

#[cfg(test)]
mod tests;
