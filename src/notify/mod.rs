//! Exchange notifications
//!
//! Delivery is best effort: a `Notifier` sends one message, the
//! `NotificationQueue` runs deliveries in the background with retries.

mod dispatcher;
mod smtp;

pub use dispatcher::{NotificationQueue, RetryPolicy};
pub use smtp::SmtpNotifier;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// One message for one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub user_id: String,
    pub email: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid message: {0}")]
    Message(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Sends a single notification
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of sending them
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            user_id = %notification.user_id,
            email = %notification.email,
            subject = %notification.subject,
            "Notification (log only): {}",
            notification.body
        );
        Ok(())
    }
}
