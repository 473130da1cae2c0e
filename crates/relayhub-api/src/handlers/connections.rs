//! Hub inspection and administrative endpoints.

use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, State};

use relayhub_core::error::AppError;
use relayhub_core::types::ConnectionId;
use relayhub_realtime::{ConnectionInfo, HubError, HubStats};

use crate::dto::response::{
    ApiResponse, GroupConnectionsResponse, MessageResponse, UserConnectionsResponse,
};
use crate::error::ApiError;
use crate::state::AppState;

fn parse_id(raw: &str) -> Result<ConnectionId, ApiError> {
    ConnectionId::from_str(raw)
        .map_err(|_| ApiError(AppError::validation(format!("Invalid connection ID: {raw}"))))
}

/// GET /api/ws/stats
pub async fn stats(State(state): State<AppState>) -> Json<ApiResponse<HubStats>> {
    Json(ApiResponse::ok(state.hub.stats().await))
}

/// GET /api/ws/connections/{id}
pub async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ConnectionInfo>>, ApiError> {
    let id = parse_id(&id)?;
    let conn = state
        .hub
        .get_connection(&id)
        .ok_or(HubError::ConnectionNotFound(id))?;
    Ok(Json(ApiResponse::ok(conn.info().await)))
}

/// DELETE /api/ws/connections/{id}
pub async fn disconnect(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let id = parse_id(&id)?;
    state.hub.disconnect(id).await?;
    Ok(Json(ApiResponse::ok(MessageResponse {
        message: format!("Connection {id} disconnected"),
    })))
}

/// GET /api/ws/users/{user_id}
pub async fn user_connections(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<ApiResponse<UserConnectionsResponse>> {
    let connections = state.hub.user_connection_count(&user_id);
    Json(ApiResponse::ok(UserConnectionsResponse {
        user_id,
        connections,
    }))
}

/// GET /api/ws/groups/{group}
pub async fn group_connections(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> Json<ApiResponse<GroupConnectionsResponse>> {
    let connections = state.hub.group_connection_count(&group);
    Json(ApiResponse::ok(GroupConnectionsResponse { group, connections }))
}
