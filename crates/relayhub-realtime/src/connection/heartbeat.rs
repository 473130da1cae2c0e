//! Heartbeat staleness rules used by the hub's periodic sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::handle::Connection;

/// Whether a connection last heard from at `last_ping` has exceeded `timeout`.
///
/// A `last_ping` in the future (clock skew) never counts as stale.
pub fn is_stale(last_ping: DateTime<Utc>, now: DateTime<Utc>, timeout: Duration) -> bool {
    match (now - last_ping).to_std() {
        Ok(elapsed) => elapsed > timeout,
        Err(_) => false,
    }
}

/// Connections among `candidates` whose heartbeat has lapsed.
pub(crate) async fn find_stale(
    candidates: Vec<Arc<Connection>>,
    now: DateTime<Utc>,
    timeout: Duration,
) -> Vec<Arc<Connection>> {
    let mut stale = Vec::new();
    for conn in candidates {
        if is_stale(conn.last_ping().await, now, timeout) {
            stale.push(conn);
        }
    }
    stale
}
