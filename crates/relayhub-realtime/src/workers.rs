//! Broadcast and ping worker pools.
//!
//! Each pool shares one job receiver. A worker handles a job by snapshotting
//! the job's shard and then acting on every member with no lock held.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::hub::delivery;
use crate::hub::registry::Registry;

/// Fan one serialized message out to every connection in a shard.
#[derive(Debug, Clone)]
pub(crate) struct BroadcastJob {
    pub shard: usize,
    pub payload: Bytes,
}

/// Ask every connection in a shard to send a protocol ping.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PingJob {
    pub shard: usize,
}

/// Spawns `count` broadcast workers draining `jobs`.
///
/// Workers exit once every job sender has been dropped.
pub(crate) fn spawn_broadcast_workers(
    registry: Arc<Registry>,
    jobs: mpsc::Receiver<BroadcastJob>,
    count: usize,
) -> Vec<JoinHandle<()>> {
    let jobs = Arc::new(Mutex::new(jobs));
    (0..count)
        .map(|worker_id| {
            let registry = registry.clone();
            let jobs = jobs.clone();
            tokio::spawn(async move {
                debug!(worker_id, "Broadcast worker started");
                while let Some(job) = next_job(&jobs).await {
                    for conn in registry.shards().snapshot(job.shard).await {
                        delivery::try_send(&conn, job.payload.clone(), |conn| {
                            debug!(
                                worker_id,
                                conn_id = %conn.id(),
                                shard = job.shard,
                                "Broadcast not delivered"
                            );
                        })
                        .await;
                    }
                }
                debug!(worker_id, "Broadcast worker stopped");
            })
        })
        .collect()
}

/// Spawns `count` ping workers draining `jobs`.
pub(crate) fn spawn_ping_workers(
    registry: Arc<Registry>,
    jobs: mpsc::Receiver<PingJob>,
    count: usize,
) -> Vec<JoinHandle<()>> {
    let jobs = Arc::new(Mutex::new(jobs));
    (0..count)
        .map(|worker_id| {
            let registry = registry.clone();
            let jobs = jobs.clone();
            tokio::spawn(async move {
                debug!(worker_id, "Ping worker started");
                while let Some(job) = next_job(&jobs).await {
                    for conn in registry.shards().snapshot(job.shard).await {
                        if conn.is_alive() {
                            conn.request_ping();
                        }
                    }
                }
                debug!(worker_id, "Ping worker stopped");
            })
        })
        .collect()
}

async fn next_job<T>(jobs: &Mutex<mpsc::Receiver<T>>) -> Option<T> {
    jobs.lock().await.recv().await
}
