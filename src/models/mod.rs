//! Data models and DTOs (Data Transfer Objects)
//!
//! Contains the domain records and all request/response structures used by the API.

pub mod exchange;
pub mod toy;
pub mod user;

// Re-export commonly used types
pub use exchange::*;
pub use toy::*;
pub use user::*;

use serde::Serialize;
use thiserror::Error;

/// A status string read back from storage that no enum variant matches
#[derive(Debug, Error)]
#[error("Unknown {kind} status: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

/// One page of a cursor-paginated listing
#[derive(Debug, Serialize)]
pub struct ListResponse<T: Serialize> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Message-only response (no data)
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
