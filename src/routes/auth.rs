//! Authentication route handlers
//!
//! Provides register and login endpoints.

use crate::error::{ApiResult, AppError};
use crate::models::{LoginRequest, RegisterRequest, UserIdResponse};
use crate::state::SharedState;
use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::WithRejection;

/// Register a new account
pub async fn register(
    State(state): State<SharedState>,
    WithRejection(Json(payload), _): WithRejection<Json<RegisterRequest>, AppError>,
) -> ApiResult<(StatusCode, Json<UserIdResponse>)> {
    let user = state.users.register(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserIdResponse {
            user_id: user.user_id,
        }),
    ))
}

/// Login with email/password
pub async fn login(
    State(state): State<SharedState>,
    WithRejection(Json(payload), _): WithRejection<Json<LoginRequest>, AppError>,
) -> ApiResult<Json<UserIdResponse>> {
    let user = state.users.login(payload).await?;
    Ok(Json(UserIdResponse {
        user_id: user.user_id,
    }))
}
