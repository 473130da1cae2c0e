//! # relayhub-api
//!
//! HTTP layer for RelayHub built on Axum.
//!
//! Provides the WebSocket upgrade endpoint that feeds sockets into the hub,
//! health and statistics endpoints, administrative disconnects, request
//! logging, and error mapping.

pub mod app;
pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_app, run_server};
pub use error::ApiError;
pub use state::AppState;
