//! Lock-partitioned mirror of the connection table.
//!
//! Broadcast and ping workers each take one shard's read lock, so workers on
//! different shards never contend with each other, and the dispatcher's
//! mirroring writes only block readers of the single shard they touch.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::RwLock;

use relayhub_core::types::ConnectionId;

use crate::connection::Connection;

/// Shard owning `id` among `count` shards. Pure function of its inputs.
pub fn shard_index(id: &ConnectionId, count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    (hasher.finish() % count as u64) as usize
}

/// `shard_count` independently locked partitions.
#[derive(Debug)]
pub struct ShardTable {
    shards: Vec<RwLock<HashMap<ConnectionId, Arc<Connection>>>>,
}

impl ShardTable {
    /// Creates `count` empty shards. `count` must be positive.
    pub fn new(count: usize) -> Self {
        Self {
            shards: (0..count).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    /// Number of shards.
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Whether the table has no shards.
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Shard index for a connection.
    pub fn shard_for(&self, id: &ConnectionId) -> usize {
        shard_index(id, self.shards.len())
    }

    pub(crate) async fn insert(&self, conn: Arc<Connection>) {
        let idx = self.shard_for(&conn.id());
        self.shards[idx].write().await.insert(conn.id(), conn);
    }

    pub(crate) async fn remove(&self, id: &ConnectionId) -> bool {
        let idx = self.shard_for(id);
        self.shards[idx].write().await.remove(id).is_some()
    }

    /// Copies one shard's members out under its read lock.
    ///
    /// The lock is released before the caller sends anything, so no shard
    /// lock is ever held across a mailbox send. Out-of-range indices yield
    /// an empty list.
    pub async fn snapshot(&self, shard: usize) -> Vec<Arc<Connection>> {
        match self.shards.get(shard) {
            Some(lock) => lock.read().await.values().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Whether `id` is present in its owning shard.
    pub async fn contains(&self, id: &ConnectionId) -> bool {
        let idx = self.shard_for(id);
        self.shards[idx].read().await.contains_key(id)
    }

    /// Live connections per shard.
    pub async fn sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.shards.len());
        for shard in &self.shards {
            sizes.push(shard.read().await.len());
        }
        sizes
    }
}
