//! Real-time hub configuration and its validation rules.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Lowest accepted compression level (deflate "huffman only").
pub const MIN_COMPRESSION_LEVEL: i32 = -2;
/// Highest accepted compression level (deflate "best compression").
pub const MAX_COMPRESSION_LEVEL: i32 = 9;

/// Real-time (WebSocket) hub configuration.
///
/// Consumed once at hub construction and validated with
/// [`RealtimeConfig::validate`] before any task is spawned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Maximum number of live connections across the hub.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Largest inbound frame accepted, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Heartbeat sweep / ping interval in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Silence after which a connection is considered dead, in seconds.
    /// Also the read deadline renewed after every inbound frame.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
    /// Capacity of each connection's outbound mailbox.
    #[serde(default = "default_mailbox_size")]
    pub mailbox_size: usize,
    /// Capacity of the register / unregister / membership request channels.
    #[serde(default = "default_register_buffer")]
    pub register_buffer_size: usize,
    /// Capacity of the routed-message channel feeding the dispatcher.
    #[serde(default = "default_broadcast_buffer")]
    pub broadcast_buffer_size: usize,
    /// Number of independently locked shard partitions.
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,
    /// Number of broadcast fan-out workers.
    #[serde(default = "default_broadcast_workers")]
    pub broadcast_worker_count: usize,
    /// Capacity of the broadcast job queue.
    #[serde(default = "default_broadcast_queue")]
    pub broadcast_queue_size: usize,
    /// Whether per-message compression is requested from the transport.
    #[serde(default)]
    pub enable_compression: bool,
    /// Compression level, in the conventional deflate range [-2, 9].
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
    /// Backpressure policy: `true` drops immediately when a mailbox is full,
    /// `false` waits up to `send_timeout_ms` first.
    #[serde(default = "default_true")]
    pub drop_on_full: bool,
    /// Escalate a dropped message to closing the slow connection.
    #[serde(default)]
    pub close_on_backpressure: bool,
    /// Bounded wait for a full mailbox, in milliseconds.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,
    /// Use the shared ping worker pool instead of per-connection ping timers.
    #[serde(default)]
    pub enable_global_ping: bool,
    /// Number of ping workers when `enable_global_ping` is set.
    #[serde(default = "default_ping_workers")]
    pub ping_worker_count: usize,
    /// Reserved for multi-node operation; not implemented.
    #[serde(default)]
    pub cluster_mode: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            connection_timeout_seconds: default_connection_timeout(),
            mailbox_size: default_mailbox_size(),
            register_buffer_size: default_register_buffer(),
            broadcast_buffer_size: default_broadcast_buffer(),
            shard_count: default_shard_count(),
            broadcast_worker_count: default_broadcast_workers(),
            broadcast_queue_size: default_broadcast_queue(),
            enable_compression: false,
            compression_level: default_compression_level(),
            drop_on_full: true,
            close_on_backpressure: false,
            send_timeout_ms: default_send_timeout(),
            enable_global_ping: false,
            ping_worker_count: default_ping_workers(),
            cluster_mode: false,
        }
    }
}

impl RealtimeConfig {
    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    /// Connection timeout as a [`Duration`].
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }

    /// Mailbox send timeout as a [`Duration`].
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Period of a connection's own ping ticker: 90% of the heartbeat interval.
    pub fn local_ping_period(&self) -> Duration {
        self.heartbeat_interval().mul_f64(0.9)
    }

    /// Validates the configuration.
    ///
    /// Pure function of `self`: returns the first violated rule as a
    /// configuration error.
    pub fn validate(&self) -> Result<(), AppError> {
        let positive = [
            ("max_connections", self.max_connections as u64),
            ("max_message_size", self.max_message_size as u64),
            ("heartbeat_interval_seconds", self.heartbeat_interval_seconds),
            ("connection_timeout_seconds", self.connection_timeout_seconds),
            ("mailbox_size", self.mailbox_size as u64),
            ("register_buffer_size", self.register_buffer_size as u64),
            ("broadcast_buffer_size", self.broadcast_buffer_size as u64),
            ("shard_count", self.shard_count as u64),
            ("broadcast_worker_count", self.broadcast_worker_count as u64),
            ("broadcast_queue_size", self.broadcast_queue_size as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(AppError::configuration(format!(
                    "realtime.{name} must be positive"
                )));
            }
        }

        if self.heartbeat_interval_seconds >= self.connection_timeout_seconds {
            return Err(AppError::configuration(format!(
                "realtime.heartbeat_interval_seconds ({}) must be less than connection_timeout_seconds ({})",
                self.heartbeat_interval_seconds, self.connection_timeout_seconds
            )));
        }

        if !(MIN_COMPRESSION_LEVEL..=MAX_COMPRESSION_LEVEL).contains(&self.compression_level) {
            return Err(AppError::configuration(format!(
                "realtime.compression_level ({}) must be within [{MIN_COMPRESSION_LEVEL}, {MAX_COMPRESSION_LEVEL}]",
                self.compression_level
            )));
        }

        if self.close_on_backpressure && self.send_timeout_ms == 0 {
            return Err(AppError::configuration(
                "realtime.close_on_backpressure requires a positive send_timeout_ms",
            ));
        }

        if !self.drop_on_full && self.send_timeout_ms == 0 {
            return Err(AppError::configuration(
                "realtime.drop_on_full = false requires a positive send_timeout_ms",
            ));
        }

        if self.enable_global_ping && self.ping_worker_count == 0 {
            return Err(AppError::configuration(
                "realtime.enable_global_ping requires a positive ping_worker_count",
            ));
        }

        Ok(())
    }
}

fn default_max_connections() -> usize {
    10_000
}

fn default_max_message_size() -> usize {
    65_536
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_connection_timeout() -> u64 {
    60
}

fn default_mailbox_size() -> usize {
    256
}

fn default_register_buffer() -> usize {
    256
}

fn default_broadcast_buffer() -> usize {
    1024
}

fn default_shard_count() -> usize {
    16
}

fn default_broadcast_workers() -> usize {
    4
}

fn default_broadcast_queue() -> usize {
    1024
}

fn default_compression_level() -> i32 {
    1
}

fn default_send_timeout() -> u64 {
    100
}

fn default_ping_workers() -> usize {
    2
}

fn default_true() -> bool {
    true
}
