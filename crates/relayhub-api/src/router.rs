//! Route definitions for the RelayHub HTTP API.
//!
//! The WebSocket endpoint lives at `/ws`; inspection and administrative
//! routes are mounted under `/api`.

use axum::{Router, middleware as axum_middleware, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new().merge(health_routes()).merge(hub_routes());

    let ws_routes = Router::new().route("/ws", get(handlers::ws::ws_upgrade));

    Router::new()
        .nest("/api", api_routes)
        .merge(ws_routes)
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn(middleware::logging::request_logging))
        .with_state(state)
}

/// Health check
fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health))
}

/// Hub statistics, lookups and administrative disconnects
fn hub_routes() -> Router<AppState> {
    Router::new()
        .route("/ws/stats", get(handlers::connections::stats))
        .route(
            "/ws/connections/{id}",
            get(handlers::connections::get_connection).delete(handlers::connections::disconnect),
        )
        .route(
            "/ws/users/{user_id}",
            get(handlers::connections::user_connections),
        )
        .route(
            "/ws/groups/{group}",
            get(handlers::connections::group_connections),
        )
}
