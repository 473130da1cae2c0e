//! Application builder: wires router, middleware and the hub into a server.

use axum::Router;
use tracing::{info, warn};

use relayhub_core::config::AppConfig;
use relayhub_core::error::AppError;
use relayhub_core::result::AppResult;
use relayhub_realtime::Hub;

use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    build_router(state)
}

/// Runs the RelayHub server until Ctrl+C, then drains connections.
pub async fn run_server(config: AppConfig) -> AppResult<()> {
    info!("Starting RelayHub server...");

    let realtime = &config.realtime;
    if realtime.enable_compression {
        info!(
            level = realtime.compression_level,
            "Per-message compression requested; negotiation is left to the transport"
        );
    }

    let hub = Hub::new(realtime.clone())?;
    let addr = config.server.bind_address();
    let grace = config.server.shutdown_grace();
    let state = AppState::new(config, hub.clone());

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            hub.close().await;
            return Err(AppError::internal(format!("Failed to bind {}: {}", addr, e)));
        }
    };

    info!("RelayHub server listening on {}", addr);

    let draining = hub.clone();
    let served = axum::serve(listener, build_app(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Upgraded sockets outlive their HTTP request; close them here.
            info!(grace_seconds = grace.as_secs(), "Closing hub");
            if tokio::time::timeout(grace, draining.close()).await.is_err() {
                warn!("Hub did not shut down within the grace period");
            }
        })
        .await;

    hub.close().await;
    served.map_err(|e| AppError::internal(format!("Server error: {}", e)))?;

    info!("RelayHub server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
