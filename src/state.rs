//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::db::Storage;
use crate::exchange::ExchangeEngine;
use crate::notify::NotificationQueue;
use crate::toys::ToyService;
use crate::users::UserService;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Persistence backend (Postgres or in-memory)
    pub storage: Arc<dyn Storage>,

    pub toys: ToyService,

    pub exchanges: ExchangeEngine,

    pub users: UserService,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, notifications: NotificationQueue) -> Self {
        Self::with_users(
            storage.clone(),
            notifications,
            UserService::new(storage),
        )
    }

    /// Build state around a custom user service (e.g. a cheaper bcrypt cost)
    pub fn with_users(
        storage: Arc<dyn Storage>,
        notifications: NotificationQueue,
        users: UserService,
    ) -> Self {
        Self {
            toys: ToyService::new(storage.clone()),
            exchanges: ExchangeEngine::new(storage.clone(), notifications),
            users,
            storage,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
