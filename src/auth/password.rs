//! Password hashing and verification
//!
//! Uses bcrypt for secure password hashing.

use crate::error::AppError;
use bcrypt::{hash, verify};

/// Hash a password using bcrypt
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    hash(password, cost)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Failed to verify password: {}", e)))
}

/// Cheapest cost bcrypt accepts, keeps test hashing fast
#[cfg(test)]
pub const TEST_COST: u32 = 4;
