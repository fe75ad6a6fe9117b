//! Cursor pagination
//!
//! A cursor is the primary key of the first row of the next page, base64
//! encoded with the standard alphabet. Pages are fetched with `limit + 1`
//! rows; the extra row only supplies the next cursor.

use crate::error::{validation_error, ApiResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};

pub const DEFAULT_LIMIT: i64 = 40;
pub const MAX_LIMIT: i64 = 100;

/// Decoded paging input shared by every listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Primary key to start from (inclusive)
    pub after: Option<String>,
    pub limit: i64,
}

impl PageRequest {
    /// Validate the raw limit and decode the raw cursor
    pub fn new(cursor: Option<&str>, limit: Option<i64>) -> ApiResult<Self> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(validation_error(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }

        let after = cursor.map(decode_cursor).transpose()?;
        Ok(Self { after, limit })
    }

    /// Number of rows to ask storage for
    pub fn fetch_limit(&self) -> i64 {
        self.limit + 1
    }
}

pub fn encode_cursor(key: &str) -> String {
    STANDARD.encode(key.as_bytes())
}

pub fn decode_cursor(cursor: &str) -> ApiResult<String> {
    let bytes = STANDARD
        .decode(cursor)
        .map_err(|_| validation_error("cursor is not valid base64"))?;
    let key = String::from_utf8(bytes).map_err(|_| validation_error("cursor is not valid UTF-8"))?;
    if key.is_empty() {
        return Err(validation_error("cursor must not be empty"));
    }
    Ok(key)
}

/// Cut a `limit + 1` fetch down to one page and the cursor of the next one
pub fn split_page<T>(
    mut rows: Vec<T>,
    limit: i64,
    key: impl Fn(&T) -> &str,
) -> (Vec<T>, Option<String>) {
    let limit = limit.max(0) as usize;
    if rows.len() > limit {
        let next = rows.drain(limit..).next();
        let cursor = next.as_ref().map(|row| encode_cursor(key(row)));
        (rows, cursor)
    } else {
        (rows, None)
    }
}
