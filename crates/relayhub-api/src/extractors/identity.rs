//! `UserIdentity` extractor: the user ID resolved by the upstream auth layer.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use relayhub_core::error::AppError;

use crate::error::ApiError;

/// Header carrying the authenticated user ID.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Opaque user identity taken from the `x-user-id` header.
///
/// The header is trusted: it is expected to be set by an authenticating
/// proxy in front of this service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity(pub String);

impl<S> FromRequestParts<S> for UserIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::authentication("Missing user identity"))?;

        Ok(UserIdentity(user_id.to_string()))
    }
}
