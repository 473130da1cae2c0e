//! Wire message envelope, typed payloads, reply builders and validation.

pub mod builder;
pub mod envelope;
pub mod types;
pub mod validator;

pub use envelope::Message;
pub use types::{MessageType, Payload};
