//! User management module
//!
//! Handles registration and login.

use crate::auth::{hash_password, verify_password};
use crate::db::Storage;
use crate::error::{not_found_error, AppError, AppResult};
use crate::models::{LoginRequest, RegisterRequest, User};
use bcrypt::DEFAULT_COST;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

pub struct UserService {
    storage: Arc<dyn Storage>,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_cost(storage, DEFAULT_COST)
    }

    pub fn with_cost(storage: Arc<dyn Storage>, bcrypt_cost: u32) -> Self {
        Self {
            storage,
            bcrypt_cost,
        }
    }

    /// Register a new account; a taken e-mail is a conflict
    pub async fn register(&self, request: RegisterRequest) -> AppResult<User> {
        request.validate()?;

        let password_hash = hash_password(&request.password, self.bcrypt_cost)?;
        let user = User::new(request.user_name, request.email, password_hash);
        let user = self.storage.insert_user(user).await?;

        info!(user_id = %user.user_id, "User registered");
        Ok(user)
    }

    /// Check credentials and return the user they belong to
    pub async fn login(&self, request: LoginRequest) -> AppResult<User> {
        request.validate()?;

        let user = self
            .storage
            .select_user_by_email(&request.email)
            .await?
            .ok_or_else(invalid_credentials)?;

        if !verify_password(&request.password, &user.password_hash)? {
            return Err(invalid_credentials());
        }

        info!(user_id = %user.user_id, "User logged in");
        Ok(user)
    }

    pub async fn find(&self, user_id: &str) -> AppResult<Option<User>> {
        self.storage.select_user(user_id).await
    }
}

fn invalid_credentials() -> AppError {
    not_found_error("invalid username or password")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStorage;
    use crate::models::UserName;
    use pretty_assertions::assert_eq;

    fn service() -> UserService {
        UserService::with_cost(Arc::new(MemoryStorage::new()), crate::auth::TEST_COST)
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            user_name: UserName {
                first_name: "Anna".into(),
                last_name: "Ivanova".into(),
                middle_name: None,
            },
            password: "secret".into(),
            confirm_password: "secret".into(),
            email: email.into(),
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let users = service();
        let registered = users.register(register_request("anna@example.com")).await.unwrap();
        assert_ne!(registered.password_hash, "secret");

        let logged_in = users
            .login(login_request("anna@example.com", "secret"))
            .await
            .unwrap();
        assert_eq!(logged_in.user_id, registered.user_id);
        assert!(users.find(&registered.user_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let users = service();
        users.register(register_request("anna@example.com")).await.unwrap();
        let err = users
            .register(register_request("anna@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_login_failures_look_the_same() {
        let users = service();
        users.register(register_request("anna@example.com")).await.unwrap();

        let wrong_password = users
            .login(login_request("anna@example.com", "nope"))
            .await
            .unwrap_err();
        let unknown = users
            .login(login_request("bob@example.com", "secret"))
            .await
            .unwrap_err();

        assert_eq!(wrong_password.to_string(), unknown.to_string());
        assert!(matches!(unknown, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let users = service();
        let mut request = register_request("not-an-email");
        request.confirm_password = "other".into();
        let err = users.register(request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
