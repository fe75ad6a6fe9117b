//! Toy route handlers

use super::extract::IdempotencyToken;
use crate::auth::CallerId;
use crate::error::{ApiResult, AppError};
use crate::models::{
    CreateToyRequest, ListResponse, MessageResponse, PatchToyRequest, Toy, ToyListRequest,
    ToyResponse, UpdateToyRequest,
};
use crate::state::SharedState;
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use tracing::debug;
use validator::Validate;

/// Create a toy (replays of the same token answer the same way)
pub async fn create_toy(
    State(state): State<SharedState>,
    Extension(CallerId(owner)): Extension<CallerId>,
    IdempotencyToken(token): IdempotencyToken,
    WithRejection(Json(payload), _): WithRejection<Json<CreateToyRequest>, AppError>,
) -> ApiResult<(StatusCode, Json<ToyResponse>)> {
    payload.validate()?;
    debug!("Creating toy: {}", payload.name);

    let toy = state.toys.create(&owner, &token, payload).await?;
    Ok((StatusCode::CREATED, Json(ToyResponse { toy })))
}

pub async fn update_toy(
    State(state): State<SharedState>,
    Extension(CallerId(owner)): Extension<CallerId>,
    WithRejection(Json(payload), _): WithRejection<Json<UpdateToyRequest>, AppError>,
) -> ApiResult<Json<ToyResponse>> {
    payload.validate()?;

    let toy = state.toys.update(&owner, payload).await?;
    Ok(Json(ToyResponse { toy }))
}

pub async fn patch_toy(
    State(state): State<SharedState>,
    Extension(CallerId(owner)): Extension<CallerId>,
    Path(toy_id): Path<String>,
    WithRejection(Json(payload), _): WithRejection<Json<PatchToyRequest>, AppError>,
) -> ApiResult<Json<ToyResponse>> {
    let toy = state
        .toys
        .set_status(&toy_id, &owner, payload.status.into())
        .await?;
    Ok(Json(ToyResponse { toy }))
}

pub async fn delete_toy(
    State(state): State<SharedState>,
    Extension(CallerId(owner)): Extension<CallerId>,
    Path(toy_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.toys.delete(&toy_id, &owner).await?;
    Ok(Json(MessageResponse::new(format!("Toy {} removed", toy_id))))
}

pub async fn get_toy(
    State(state): State<SharedState>,
    Path(toy_id): Path<String>,
) -> ApiResult<Json<ToyResponse>> {
    let toy = state.toys.get(&toy_id).await?;
    Ok(Json(ToyResponse { toy }))
}

/// A live toy the caller owns
pub async fn get_own_toy(
    State(state): State<SharedState>,
    Extension(CallerId(owner)): Extension<CallerId>,
    Path(toy_id): Path<String>,
) -> ApiResult<Json<ToyResponse>> {
    let toy = state.toys.get_owned(&toy_id, &owner).await?;
    Ok(Json(ToyResponse { toy }))
}

pub async fn list_toys(
    State(state): State<SharedState>,
    WithRejection(Json(payload), _): WithRejection<Json<ToyListRequest>, AppError>,
) -> ApiResult<Json<ListResponse<Toy>>> {
    payload.validate()?;

    let page = state.toys.list(&payload).await?;
    Ok(Json(page))
}
