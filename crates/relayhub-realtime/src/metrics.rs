//! Hub metrics counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Hub-level monotonic counters.
#[derive(Debug, Default)]
pub struct HubMetrics {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    connections_rejected: AtomicU64,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
    broadcast_jobs_dropped: AtomicU64,
    heartbeat_timeouts: AtomicU64,
}

impl HubMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn broadcast_job_dropped(&self) {
        self.broadcast_jobs_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn heartbeat_timeout(&self) {
        self.heartbeat_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            broadcast_jobs_dropped: self.broadcast_jobs_dropped.load(Ordering::Relaxed),
            heartbeat_timeouts: self.heartbeat_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Serializable counter snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Connections ever registered
    pub connections_opened: u64,
    /// Connections unregistered
    pub connections_closed: u64,
    /// Registrations refused at capacity
    pub connections_rejected: u64,
    /// Inbound application messages decoded
    pub messages_received: u64,
    /// Frames enqueued onto mailboxes
    pub messages_sent: u64,
    /// Frames dropped by backpressure
    pub messages_dropped: u64,
    /// Broadcast jobs shed because the job queue was full
    pub broadcast_jobs_dropped: u64,
    /// Connections closed by the heartbeat sweep
    pub heartbeat_timeouts: u64,
}

/// Point-in-time view of the hub for stats endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStats {
    /// Live connections.
    pub connections: usize,
    /// Distinct connected users.
    pub users: usize,
    /// Non-empty groups.
    pub groups: usize,
    /// Number of shard partitions.
    pub shard_count: usize,
    /// Live connections per shard.
    pub shard_sizes: Vec<usize>,
    /// Monotonic counters.
    pub counters: MetricsSnapshot,
}
