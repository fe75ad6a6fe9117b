//! Caller identity and password handling
//!
//! Protected routes trust the `x-user-id` header once the user it names is
//! known to storage.

mod middleware;
mod password;

pub use middleware::require_user;
pub use password::{hash_password, verify_password};
#[cfg(test)]
pub use password::TEST_COST;

/// Header carrying the caller's user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller, inserted into request extensions by `require_user`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId(pub String);
