//! Exchange models and DTOs
//!
//! An exchange is the aggregate of exactly two participant rows
//! (`ExchangeDetails`), one per (user, toy) side of the swap.

use super::{UnknownStatus, UserName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Aggregate status of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStatus {
    Created,
    Confirm,
    Success,
    Failed,
}

impl ExchangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeStatus::Created => "created",
            ExchangeStatus::Confirm => "confirm",
            ExchangeStatus::Success => "success",
            ExchangeStatus::Failed => "failed",
        }
    }

    /// `created` and `confirm` exchanges still hold their toys
    pub fn is_active(&self) -> bool {
        matches!(self, ExchangeStatus::Created | ExchangeStatus::Confirm)
    }
}

impl fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ExchangeStatus::Created),
            "confirm" => Ok(ExchangeStatus::Confirm),
            "success" => Ok(ExchangeStatus::Success),
            "failed" => Ok(ExchangeStatus::Failed),
            other => Err(UnknownStatus {
                kind: "exchange",
                value: other.to_string(),
            }),
        }
    }
}

/// Status of one participant's side of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantStatus {
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "confirm_1")]
    Confirm1,
    #[serde(rename = "confirm_2")]
    Confirm2,
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "failed")]
    Failed,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Created => "created",
            ParticipantStatus::Confirm1 => "confirm_1",
            ParticipantStatus::Confirm2 => "confirm_2",
            ParticipantStatus::Success => "success",
            ParticipantStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ParticipantStatus::Created),
            "confirm_1" => Ok(ParticipantStatus::Confirm1),
            "confirm_2" => Ok(ParticipantStatus::Confirm2),
            "success" => Ok(ParticipantStatus::Success),
            "failed" => Ok(ParticipantStatus::Failed),
            other => Err(UnknownStatus {
                kind: "participant",
                value: other.to_string(),
            }),
        }
    }
}

/// Exchange row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub exchange_id: String,
    pub src_toy_id: String,
    pub dst_toy_id: String,
    pub idempotency_token: String,
    pub status: ExchangeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Exchange {
    pub fn new(src_toy_id: &str, dst_toy_id: &str, idempotency_token: &str) -> Self {
        let now = Utc::now();
        Self {
            exchange_id: Uuid::new_v4().to_string(),
            src_toy_id: src_toy_id.to_string(),
            dst_toy_id: dst_toy_id.to_string(),
            idempotency_token: idempotency_token.to_string(),
            status: ExchangeStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Participant row, one per side of an exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeDetails {
    pub exchange_id: String,
    pub toy_id: String,
    pub user_id: String,
    pub status: ParticipantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExchangeDetails {
    pub fn new(exchange_id: &str, side: &UserToy) -> Self {
        let now = Utc::now();
        Self {
            exchange_id: exchange_id.to_string(),
            toy_id: side.toy_id.clone(),
            user_id: side.user_id.clone(),
            status: ParticipantStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Flat row of exchange ⨝ details ⨝ toy ⨝ user
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeParticipant {
    pub exchange_id: String,
    pub exchange_status: ExchangeStatus,
    pub idempotency_token: String,
    pub src_toy_id: String,
    pub dst_toy_id: String,
    pub exchange_created_at: DateTime<Utc>,
    pub exchange_updated_at: DateTime<Utc>,

    pub toy_id: String,
    pub toy_name: String,
    pub toy_description: Option<String>,
    pub toy_photo_url: Option<String>,

    pub user_id: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,

    pub participant_status: ParticipantStatus,
}

/// Public toy fields shown inside an exchange
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToyInfo {
    pub toy_id: String,
    pub user_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// One side of an exchange as seen by clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantView {
    pub toy: ToyInfo,
    pub user: UserName,
    pub status: ParticipantStatus,
}

/// Participant-centric view of a whole exchange
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeView {
    pub exchange_id: String,
    pub src_toy_id: String,
    pub dst_toy_id: String,
    pub idempotency_token: String,
    pub status: ExchangeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "exchange_details")]
    pub participants: Vec<ParticipantView>,
}

impl ExchangeView {
    /// Assemble a view from the joined rows of one exchange
    pub fn from_rows(rows: &[ExchangeParticipant]) -> Option<Self> {
        let head = rows.first()?;

        let participants = rows
            .iter()
            .map(|row| ParticipantView {
                toy: ToyInfo {
                    toy_id: row.toy_id.clone(),
                    user_id: row.user_id.clone(),
                    name: row.toy_name.clone(),
                    description: row.toy_description.clone(),
                    photo_url: row.toy_photo_url.clone(),
                },
                user: UserName {
                    first_name: row.first_name.clone(),
                    last_name: row.last_name.clone(),
                    middle_name: row.middle_name.clone(),
                },
                status: row.participant_status,
            })
            .collect();

        Some(Self {
            exchange_id: head.exchange_id.clone(),
            src_toy_id: head.src_toy_id.clone(),
            dst_toy_id: head.dst_toy_id.clone(),
            idempotency_token: head.idempotency_token.clone(),
            status: head.exchange_status,
            created_at: head.exchange_created_at,
            updated_at: head.exchange_updated_at,
            participants,
        })
    }

    pub fn participant(&self, user_id: &str) -> Option<&ParticipantView> {
        self.participants.iter().find(|p| p.toy.user_id == user_id)
    }
}

// ============================================
// Request/Response Types
// ============================================

/// One side of a proposal: a user and the toy they give
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct UserToy {
    #[validate(length(min = 1, message = "user_id is required"))]
    pub user_id: String,
    #[validate(length(min = 1, message = "toy_id is required"))]
    pub toy_id: String,
}

impl UserToy {
    pub fn new(user_id: impl Into<String>, toy_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            toy_id: toy_id.into(),
        }
    }
}

/// Request to propose an exchange between two (user, toy) pairs
#[derive(Debug, Deserialize, Validate)]
pub struct ProposeExchangeRequest {
    #[validate(nested)]
    pub user_toy_1: UserToy,
    #[validate(nested)]
    pub user_toy_2: UserToy,
}

/// Statuses a participant may set through the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ParticipantStatusChange {
    #[serde(rename = "confirm_1")]
    Confirm1,
    #[serde(rename = "confirm_2")]
    Confirm2,
    #[serde(rename = "failed")]
    Failed,
}

impl From<ParticipantStatusChange> for ParticipantStatus {
    fn from(change: ParticipantStatusChange) -> Self {
        match change {
            ParticipantStatusChange::Confirm1 => ParticipantStatus::Confirm1,
            ParticipantStatusChange::Confirm2 => ParticipantStatus::Confirm2,
            ParticipantStatusChange::Failed => ParticipantStatus::Failed,
        }
    }
}

/// Request to move the caller's side of an exchange
#[derive(Debug, Deserialize)]
pub struct PatchExchangeRequest {
    pub status: ParticipantStatusChange,
}

/// Filters for exchange listings
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ExchangeQuery {
    #[validate(length(min = 1, message = "statuses must not be empty"))]
    pub statuses: Option<Vec<ExchangeStatus>>,
}

/// Request for one page of the caller's exchanges
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ExchangeListRequest {
    #[serde(default)]
    #[validate(nested)]
    pub query: ExchangeQuery,
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: Option<i64>,
    #[validate(length(min = 1, message = "cursor must not be empty"))]
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExchangeResponse {
    pub exchange: Exchange,
}

#[derive(Debug, Serialize)]
pub struct ExchangeViewResponse {
    pub exchange: ExchangeView,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(user: &str, toy: &str, status: ParticipantStatus) -> ExchangeParticipant {
        let now = Utc::now();
        ExchangeParticipant {
            exchange_id: "ex-1".into(),
            exchange_status: ExchangeStatus::Created,
            idempotency_token: "tk".into(),
            src_toy_id: "t1".into(),
            dst_toy_id: "t2".into(),
            exchange_created_at: now,
            exchange_updated_at: now,
            toy_id: toy.into(),
            toy_name: format!("toy {}", toy),
            toy_description: None,
            toy_photo_url: None,
            user_id: user.into(),
            first_name: "Ann".into(),
            middle_name: None,
            last_name: "Lee".into(),
            participant_status: status,
        }
    }

    #[test]
    fn test_participant_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&ParticipantStatus::Confirm1).unwrap(),
            "\"confirm_1\""
        );
        for status in [
            ParticipantStatus::Created,
            ParticipantStatus::Confirm1,
            ParticipantStatus::Confirm2,
            ParticipantStatus::Success,
            ParticipantStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ParticipantStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_view_from_rows() {
        let rows = vec![
            row("u1", "t1", ParticipantStatus::Confirm1),
            row("u2", "t2", ParticipantStatus::Created),
        ];
        let view = ExchangeView::from_rows(&rows).unwrap();

        assert_eq!(view.exchange_id, "ex-1");
        assert_eq!(view.participants.len(), 2);
        assert_eq!(view.participant("u1").unwrap().status, ParticipantStatus::Confirm1);
        assert_eq!(view.participant("u2").unwrap().toy.toy_id, "t2");
        assert!(view.participant("u3").is_none());
    }

    #[test]
    fn test_view_from_no_rows() {
        assert!(ExchangeView::from_rows(&[]).is_none());
    }

    #[test]
    fn test_patch_request_rejects_success() {
        let parsed: Result<PatchExchangeRequest, _> =
            serde_json::from_str(r#"{"status":"success"}"#);
        assert!(parsed.is_err());

        let parsed: PatchExchangeRequest =
            serde_json::from_str(r#"{"status":"confirm_2"}"#).unwrap();
        assert_eq!(parsed.status, ParticipantStatusChange::Confirm2);
    }
}
