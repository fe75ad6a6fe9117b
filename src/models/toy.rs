//! Toy models and DTOs

use super::UnknownStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Lifecycle status of a toy. `Removed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToyStatus {
    Created,
    Exchanging,
    Removed,
}

impl ToyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToyStatus::Created => "created",
            ToyStatus::Exchanging => "exchanging",
            ToyStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for ToyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToyStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ToyStatus::Created),
            "exchanging" => Ok(ToyStatus::Exchanging),
            "removed" => Ok(ToyStatus::Removed),
            other => Err(UnknownStatus {
                kind: "toy",
                value: other.to_string(),
            }),
        }
    }
}

/// A toy owned by exactly one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toy {
    pub toy_id: String,
    pub user_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub idempotency_token: String,
    pub status: ToyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Toy {
    /// Build a fresh toy in `created` status with a new id
    pub fn new(
        owner: &str,
        name: String,
        description: Option<String>,
        photo_url: Option<String>,
        idempotency_token: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            toy_id: Uuid::new_v4().to_string(),
            user_id: owner.to_string(),
            name,
            description,
            photo_url,
            idempotency_token: idempotency_token.to_string(),
            status: ToyStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Mutable fields of a toy; `photo_url: None` keeps the stored photo
#[derive(Debug, Clone)]
pub struct ToyChanges {
    pub name: String,
    pub description: Option<String>,
    pub photo_url: Option<String>,
}

/// Filters for toy listings, all AND-ed together
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ToyQuery {
    #[validate(length(min = 1, message = "statuses must not be empty"))]
    pub statuses: Option<Vec<ToyStatus>>,

    #[validate(length(min = 1, message = "user_ids must not be empty"))]
    pub user_ids: Option<Vec<String>>,

    #[validate(length(min = 1, message = "exclude_user_ids must not be empty"))]
    pub exclude_user_ids: Option<Vec<String>>,
}

impl ToyQuery {
    /// Whether a toy passes every filter of this query
    pub fn matches(&self, toy: &Toy) -> bool {
        let status_ok = match &self.statuses {
            Some(statuses) => statuses.contains(&toy.status),
            None => toy.status != ToyStatus::Removed,
        };
        let user_ok = self
            .user_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&toy.user_id));
        let not_excluded = self
            .exclude_user_ids
            .as_ref()
            .map_or(true, |ids| !ids.contains(&toy.user_id));

        status_ok && user_ok && not_excluded
    }
}

// ============================================
// Request/Response Types
// ============================================

/// Request to create a toy
#[derive(Debug, Deserialize, Validate)]
pub struct CreateToyRequest {
    #[validate(length(min = 1, max = 255, message = "Toy name must be between 1 and 255 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub photo_url: Option<String>,
}

/// Request to replace a toy's mutable fields
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateToyRequest {
    #[validate(length(min = 1, message = "toy_id is required"))]
    pub toy_id: String,
    #[validate(length(min = 1, max = 255, message = "Toy name must be between 1 and 255 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub photo_url: Option<String>,
}

/// Statuses a client may set directly; removal goes through DELETE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToyStatusChange {
    Created,
    Exchanging,
}

impl From<ToyStatusChange> for ToyStatus {
    fn from(change: ToyStatusChange) -> Self {
        match change {
            ToyStatusChange::Created => ToyStatus::Created,
            ToyStatusChange::Exchanging => ToyStatus::Exchanging,
        }
    }
}

/// Request to move a toy between `created` and `exchanging`
#[derive(Debug, Deserialize)]
pub struct PatchToyRequest {
    pub status: ToyStatusChange,
}

/// Request for one page of toys
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ToyListRequest {
    #[serde(default)]
    #[validate(nested)]
    pub query: ToyQuery,
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: Option<i64>,
    #[validate(length(min = 1, message = "cursor must not be empty"))]
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ToyResponse {
    pub toy: Toy,
}
