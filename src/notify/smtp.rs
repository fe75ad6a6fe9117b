//! SMTP delivery through lettre

use super::{Notification, Notifier, NotifyError};
use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

/// Plain SMTP sender, e.g. a local MailHog
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Message(format!("invalid sender '{}': {}", config.from, e)))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .build();

        Ok(Self { transport, from })
    }

    fn build_message(&self, notification: &Notification) -> Result<Message, NotifyError> {
        let to = notification
            .email
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Message(format!("invalid recipient: {}", e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(notification.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|e| NotifyError::Message(e.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = self.build_message(notification)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        debug!(user_id = %notification.user_id, "Notification sent over SMTP");
        Ok(())
    }
}
