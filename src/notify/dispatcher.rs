//! Background delivery queue with retries

use super::{Notification, Notifier};
use crate::config::NotificationConfig;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};

/// How often and how patiently a delivery is retried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound of the random delay added to every backoff
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &NotificationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
            max_jitter: config.base_delay / 4,
        }
    }

    /// Pause after failed attempt number `attempt` (1-based): `base * attempt + jitter`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.base_delay * attempt + jitter
    }
}

/// Deliver one notification, retrying per `policy`. Returns whether it got through.
pub async fn deliver(notifier: &dyn Notifier, policy: &RetryPolicy, job: &Notification) -> bool {
    for attempt in 1..=policy.max_attempts {
        match notifier.notify(job).await {
            Ok(()) => {
                debug!(user_id = %job.user_id, attempt, "Notification delivered");
                return true;
            }
            Err(e) => {
                warn!(user_id = %job.user_id, attempt, error = %e, "Notification attempt failed");
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }

    error!(
        user_id = %job.user_id,
        attempts = policy.max_attempts,
        "Giving up on notification"
    );
    false
}

/// Handle to the background notification worker
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<Notification>,
}

impl NotificationQueue {
    /// Spawn the worker; every job is delivered in its own task
    pub fn start(notifier: Arc<dyn Notifier>, policy: RetryPolicy, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Notification>(capacity.max(1));

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let notifier = notifier.clone();
                let policy = policy.clone();
                tokio::spawn(async move {
                    deliver(notifier.as_ref(), &policy, &job).await;
                });
            }
            debug!("Notification queue closed");
        });

        Self { tx }
    }

    /// Hand a job to the worker without waiting. Returns false if it was dropped.
    pub fn enqueue(&self, job: Notification) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                warn!(user_id = %job.user_id, "Notification queue full, dropping job");
                false
            }
            Err(TrySendError::Closed(job)) => {
                warn!(user_id = %job.user_id, "Notification queue closed, dropping job");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    fn instant_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    fn job() -> Notification {
        Notification {
            user_id: "u1".into(),
            email: "u1@example.com".into(),
            subject: "s".into(),
            body: "b".into(),
        }
    }

    #[test]
    fn test_backoff_grows_with_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::from_millis(20),
        };
        for _ in 0..50 {
            let delay = policy.delay_for(2);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(220));
        }
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from_config(&NotificationConfig::default());
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.max_jitter, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_deliver_retries_until_success() {
        let notifier = RecordingNotifier::failing(2);
        assert!(deliver(&notifier, &instant_policy(3), &job()).await);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 3);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_deliver_gives_up_after_max_attempts() {
        let notifier = RecordingNotifier::failing(5);
        assert!(!deliver(&notifier, &instant_policy(3), &job()).await);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 3);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_queue_delivers_in_background() {
        let notifier = Arc::new(RecordingNotifier::default());
        let queue = NotificationQueue::start(notifier.clone(), instant_policy(1), 8);

        assert!(queue.enqueue(job()));
        let sent = notifier.wait_for(1).await;
        assert_eq!(sent, vec![job()]);
    }
}
