//! Request extractors shared by the handlers

use crate::error::{validation_error, AppError};
use axum::{extract::FromRequestParts, http::request::Parts};

/// Header carrying the client's idempotency token
pub const IDEMPOTENCY_HEADER: &str = "x-idempotency-token";

/// Idempotency token of a create request; required and non-empty
#[derive(Debug, Clone)]
pub struct IdempotencyToken(pub String);

impl<S> FromRequestParts<S> for IdempotencyToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(IDEMPOTENCY_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| IdempotencyToken(token.to_string()))
            .ok_or_else(|| validation_error("Missing x-idempotency-token header"))
    }
}
