//! Exchange route handlers

use super::extract::IdempotencyToken;
use crate::auth::CallerId;
use crate::error::{ApiResult, AppError};
use crate::models::{
    ExchangeListRequest, ExchangeResponse, ExchangeView, ExchangeViewResponse, ListResponse,
    PatchExchangeRequest, ProposeExchangeRequest,
};
use crate::state::SharedState;
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use validator::Validate;

/// Propose an exchange between two (user, toy) pairs
pub async fn propose_exchange(
    State(state): State<SharedState>,
    Extension(CallerId(requester)): Extension<CallerId>,
    IdempotencyToken(token): IdempotencyToken,
    WithRejection(Json(payload), _): WithRejection<Json<ProposeExchangeRequest>, AppError>,
) -> ApiResult<(StatusCode, Json<ExchangeResponse>)> {
    payload.validate()?;

    let exchange = state.exchanges.propose(&requester, &token, &payload).await?;
    Ok((StatusCode::CREATED, Json(ExchangeResponse { exchange })))
}

pub async fn get_exchange(
    State(state): State<SharedState>,
    Path(exchange_id): Path<String>,
) -> ApiResult<Json<ExchangeViewResponse>> {
    let exchange = state.exchanges.get(&exchange_id).await?;
    Ok(Json(ExchangeViewResponse { exchange }))
}

/// Move the caller's side of the exchange
pub async fn patch_exchange(
    State(state): State<SharedState>,
    Extension(CallerId(user_id)): Extension<CallerId>,
    Path(exchange_id): Path<String>,
    WithRejection(Json(payload), _): WithRejection<Json<PatchExchangeRequest>, AppError>,
) -> ApiResult<Json<ExchangeViewResponse>> {
    let exchange = state
        .exchanges
        .transition(&exchange_id, &user_id, payload.status.into())
        .await?;
    Ok(Json(ExchangeViewResponse { exchange }))
}

pub async fn list_exchanges(
    State(state): State<SharedState>,
    Extension(CallerId(user_id)): Extension<CallerId>,
    WithRejection(Json(payload), _): WithRejection<Json<ExchangeListRequest>, AppError>,
) -> ApiResult<Json<ListResponse<ExchangeView>>> {
    payload.validate()?;

    let page = state.exchanges.list(&user_id, &payload).await?;
    Ok(Json(page))
}
