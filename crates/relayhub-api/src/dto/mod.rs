//! Request and response payloads.

pub mod response;

pub use response::ApiResponse;
