//! User models and DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A person's name as shown to exchange partners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct UserName {
    #[validate(length(min = 1, message = "first_name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "last_name is required"))]
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
}

/// User represents a registered user in the system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    #[serde(flatten)]
    pub name: UserName,
    pub email: String,
    #[serde(skip_serializing)] // Never send password hash to client
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: UserName, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4().to_string(),
            name,
            email,
            password_hash,
            created_at: now,
            updated_at: now,
        }
    }

    /// "Last First Middle", the way names are addressed in mail
    pub fn full_name(&self) -> String {
        let mut parts = vec![self.name.last_name.as_str(), self.name.first_name.as_str()];
        if let Some(middle) = &self.name.middle_name {
            parts.push(middle);
        }
        parts.join(" ")
    }
}

// ============================================
// Request/Response Types
// ============================================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(nested)]
    pub user_name: UserName,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserIdResponse {
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(middle: Option<&str>) -> UserName {
        UserName {
            first_name: "Ivan".into(),
            last_name: "Petrov".into(),
            middle_name: middle.map(String::from),
        }
    }

    #[test]
    fn test_full_name() {
        let user = User::new(name(None), "ivan@example.com".into(), "hash".into());
        assert_eq!(user.full_name(), "Petrov Ivan");

        let user = User::new(name(Some("Sergeevich")), "ivan@example.com".into(), "hash".into());
        assert_eq!(user.full_name(), "Petrov Ivan Sergeevich");
    }

    #[test]
    fn test_register_request_checks_confirmation() {
        let request = RegisterRequest {
            user_name: name(None),
            password: "secret".into(),
            confirm_password: "other".into(),
            email: "ivan@example.com".into(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_password_hash_is_not_serialized() {
        let user = User::new(name(None), "ivan@example.com".into(), "hash".into());
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["first_name"], "Ivan");
    }
}
