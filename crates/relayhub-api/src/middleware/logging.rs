//! Request/response logging middleware.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{info, warn};

use crate::extractors::identity::USER_ID_HEADER;

/// Logs method, path, caller identity, status, and duration.
///
/// For `/ws` the duration covers only the upgrade handshake.
pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let user_id = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis();

    if response.status().is_server_error() {
        warn!(%method, %path, %user_id, status, duration_ms, "HTTP request failed");
    } else {
        info!(%method, %path, %user_id, status, duration_ms, "HTTP request");
    }

    response
}
