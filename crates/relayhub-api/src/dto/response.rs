//! Response DTOs.

use serde::{Deserialize, Serialize};

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Simple message response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Message.
    pub message: String,
}

/// Live connection count for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConnectionsResponse {
    /// User ID.
    pub user_id: String,
    /// Live connections.
    pub connections: usize,
}

/// Live member count for one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConnectionsResponse {
    /// Group name.
    pub group: String,
    /// Live member connections.
    pub connections: usize,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
    /// Uptime.
    pub uptime_seconds: u64,
    /// Live WebSocket connections.
    pub connections: usize,
}
