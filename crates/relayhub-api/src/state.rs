//! Application state shared across all handlers and middleware.

use std::sync::Arc;
use std::time::Instant;

use relayhub_core::config::AppConfig;
use relayhub_realtime::Hub;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Real-time connection hub
    pub hub: Hub,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Creates state around a running hub.
    pub fn new(config: AppConfig, hub: Hub) -> Self {
        Self {
            config: Arc::new(config),
            hub,
            started_at: Instant::now(),
        }
    }
}
