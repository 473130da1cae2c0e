//! # relayhub-realtime
//!
//! Sharded real-time connection hub. Provides:
//!
//! - Connection actors with separate reader and writer loops
//! - A single-writer dispatcher for registration, membership and routing
//! - User, group and broadcast-to-all delivery with per-connection backpressure
//! - Lock-partitioned shards drained by broadcast and ping worker pools
//! - Heartbeat sweeping of stale connections
//!
//! The hub is transport-neutral: socket halves are adapted into
//! [`transport::Frame`] streams and sinks by the HTTP layer.

pub mod connection;
pub mod error;
pub mod hub;
pub mod message;
pub mod metrics;
pub mod shard;
pub mod transport;
mod workers;

pub use connection::{Connection, ConnectionInfo, ConnectionStatus, Mailbox};
pub use error::HubError;
pub use hub::{Hub, HubHandle, SendOutcome};
pub use message::{Message, MessageType, Payload};
pub use metrics::{HubStats, MetricsSnapshot};
pub use transport::{CloseFrame, Frame, TransportError};
