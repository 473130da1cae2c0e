//! Canonical connection indices: by ID, by user, by group, plus the shard mirror.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use relayhub_core::types::ConnectionId;

use crate::connection::Connection;
use crate::shard::ShardTable;

/// Every index the hub keeps about live connections.
///
/// Mutated only by the dispatcher task (and by `Hub::close` once the
/// dispatcher has stopped). Readers on other tasks see each DashMap entry
/// consistently but may observe the indices mid-update.
#[derive(Debug)]
pub struct Registry {
    /// Connection ID → connection.
    by_id: DashMap<ConnectionId, Arc<Connection>>,
    /// User ID → that user's connections.
    by_user: DashMap<String, HashSet<ConnectionId>>,
    /// Group name → member connections.
    by_group: DashMap<String, HashSet<ConnectionId>>,
    /// Connection ID → groups it belongs to, for O(groups) unregister.
    memberships: DashMap<ConnectionId, HashSet<String>>,
    /// Lock-partitioned mirror of `by_id`.
    shards: ShardTable,
    /// Live connection count.
    live: AtomicUsize,
}

impl Registry {
    /// Creates empty indices with `shard_count` shards.
    pub fn new(shard_count: usize) -> Self {
        Self {
            by_id: DashMap::new(),
            by_user: DashMap::new(),
            by_group: DashMap::new(),
            memberships: DashMap::new(),
            shards: ShardTable::new(shard_count),
            live: AtomicUsize::new(0),
        }
    }

    /// Inserts a connection into every index, including the groups it
    /// already belongs to.
    pub(crate) async fn insert(&self, conn: Arc<Connection>, groups: HashSet<String>) {
        let id = conn.id();
        self.by_user
            .entry(conn.user_id().to_string())
            .or_default()
            .insert(id);
        for group in &groups {
            self.by_group.entry(group.clone()).or_default().insert(id);
        }
        self.memberships.insert(id, groups);
        self.shards.insert(conn.clone()).await;
        self.by_id.insert(id, conn);
        self.live.fetch_add(1, Ordering::SeqCst);
    }

    /// Removes a connection from every index. `None` if it was not present.
    pub(crate) async fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let (_, conn) = self.by_id.remove(id)?;
        self.live.fetch_sub(1, Ordering::SeqCst);

        remove_member(&self.by_user, conn.user_id(), id);
        if let Some((_, groups)) = self.memberships.remove(id) {
            for group in &groups {
                remove_member(&self.by_group, group, id);
            }
        }
        self.shards.remove(id).await;

        Some(conn)
    }

    /// Adds `id` to `group`. Ignored for unknown connections.
    pub(crate) fn join(&self, id: &ConnectionId, group: &str) -> bool {
        let Some(mut groups) = self.memberships.get_mut(id) else {
            return false;
        };
        groups.insert(group.to_string());
        drop(groups);
        self.by_group
            .entry(group.to_string())
            .or_default()
            .insert(*id);
        true
    }

    /// Removes `id` from `group`. Ignored for unknown connections.
    pub(crate) fn leave(&self, id: &ConnectionId, group: &str) -> bool {
        let Some(mut groups) = self.memberships.get_mut(id) else {
            return false;
        };
        groups.remove(group);
        drop(groups);
        remove_member(&self.by_group, group, id);
        true
    }

    /// Looks up a connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.by_id.get(id).map(|entry| entry.value().clone())
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Connections belonging to a user.
    pub fn user_members(&self, user_id: &str) -> Vec<Arc<Connection>> {
        self.resolve(self.by_user.get(user_id).map(|e| e.value().clone()))
    }

    /// Connections belonging to a group.
    pub fn group_members(&self, group: &str) -> Vec<Arc<Connection>> {
        self.resolve(self.by_group.get(group).map(|e| e.value().clone()))
    }

    fn resolve(&self, ids: Option<HashSet<ConnectionId>>) -> Vec<Arc<Connection>> {
        ids.unwrap_or_default()
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Number of connections a user has.
    pub fn user_count(&self, user_id: &str) -> usize {
        self.by_user.get(user_id).map(|e| e.len()).unwrap_or(0)
    }

    /// Number of connections in a group.
    pub fn group_count(&self, group: &str) -> usize {
        self.by_group.get(group).map(|e| e.len()).unwrap_or(0)
    }

    /// Live connection count, read from the atomic counter.
    pub fn len(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct connected users.
    pub fn distinct_users(&self) -> usize {
        self.by_user.len()
    }

    /// Non-empty groups.
    pub fn distinct_groups(&self) -> usize {
        self.by_group.len()
    }

    /// Snapshot of every live connection.
    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.by_id.iter().map(|e| e.value().clone()).collect()
    }

    /// The shard mirror.
    pub fn shards(&self) -> &ShardTable {
        &self.shards
    }
}

/// Removes `id` from the set under `key`, dropping the key once empty.
fn remove_member(index: &DashMap<String, HashSet<ConnectionId>>, key: &str, id: &ConnectionId) {
    if let Some(mut members) = index.get_mut(key) {
        members.remove(id);
        if members.is_empty() {
            drop(members);
            index.remove_if(key, |_, members| members.is_empty());
        }
    }
}
