//! Authentication middleware
//!
//! Resolves the caller from the user id header.

use super::{CallerId, USER_ID_HEADER};
use crate::error::AppError;
use crate::state::SharedState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

/// Reject requests without a known caller, pass the caller id on otherwise
pub async fn require_user(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user_id = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing x-user-id header".to_string()))?
        .to_string();

    if state.users.find(&user_id).await?.is_none() {
        debug!(user_id = %user_id, "Unknown caller");
        return Err(AppError::Unauthorized("Unknown user".to_string()));
    }

    // Insert caller into request extensions for handlers to use
    request.extensions_mut().insert(CallerId(user_id));

    Ok(next.run(request).await)
}
