//! Connection actors: per-client state, socket loops, request handling.

pub mod handle;
pub mod heartbeat;
mod inbound;
pub mod io;
pub mod status;

pub use handle::{Connection, ConnectionInfo, Mailbox};
pub use io::ConnectionTasks;
pub use status::ConnectionStatus;
