//! Exchange negotiation engine
//!
//! Validates proposals, plans participant transitions and queues the
//! confirmation notices whenever a change leaves the exchange in `confirm`.

use super::status::{check_transition, derive_exchange_status};
use crate::db::{ParticipantTransition, Storage};
use crate::error::{conflict_error, not_found_error, validation_error, AppError, AppResult};
use crate::models::{
    Exchange, ExchangeDetails, ExchangeListRequest, ExchangeParticipant, ExchangeStatus,
    ExchangeView, ListResponse, ParticipantStatus, ProposeExchangeRequest, User,
};
use crate::notify::{Notification, NotificationQueue};
use crate::pagination::{split_page, PageRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Decide what a participant's status change does to an exchange.
///
/// Runs against the participant rows as currently stored. Re-sending the
/// current status is a no-op; once the exchange reached `success` or
/// `failed` nothing moves any more.
pub fn plan_transition(
    details: &[ExchangeDetails],
    user_id: &str,
    target: ParticipantStatus,
) -> AppResult<ParticipantTransition> {
    let [first, second] = details else {
        return Err(AppError::Internal(format!(
            "exchange has {} participant rows, expected 2",
            details.len()
        )));
    };

    let (me, partner) = if first.user_id == user_id {
        (first, second)
    } else if second.user_id == user_id {
        (second, first)
    } else {
        return Err(not_found_error(format!(
            "Exchange {} not found for user {}",
            first.exchange_id, user_id
        )));
    };

    let previous_status = derive_exchange_status(me.status, partner.status);

    if me.status == target {
        return Ok(ParticipantTransition {
            previous_status,
            exchange_status: previous_status,
            updates: Vec::new(),
        });
    }

    if matches!(previous_status, ExchangeStatus::Success | ExchangeStatus::Failed) {
        return Err(conflict_error(format!(
            "Exchange {} is already {}",
            me.exchange_id, previous_status
        )));
    }

    check_transition(me.status, target, previous_status)?;

    let exchange_status = derive_exchange_status(target, partner.status);
    let updates = if exchange_status == ExchangeStatus::Success {
        vec![
            (me.user_id.clone(), ParticipantStatus::Success),
            (partner.user_id.clone(), ParticipantStatus::Success),
        ]
    } else {
        vec![(me.user_id.clone(), target)]
    };

    Ok(ParticipantTransition {
        previous_status,
        exchange_status,
        updates,
    })
}

/// Message telling `recipient` how to reach `partner`
fn confirmation_notice(exchange_id: &str, recipient: &User, partner: &User) -> Notification {
    Notification {
        user_id: recipient.user_id.clone(),
        email: recipient.email.clone(),
        subject: "Someone wants to get in touch".to_string(),
        body: format!(
            "Hello, {}! Exchange {} is confirmed by both sides. You can contact {} at {}.",
            recipient.name.first_name,
            exchange_id,
            partner.full_name(),
            partner.email
        ),
    }
}

pub struct ExchangeEngine {
    storage: Arc<dyn Storage>,
    notifications: NotificationQueue,
}

impl ExchangeEngine {
    pub fn new(storage: Arc<dyn Storage>, notifications: NotificationQueue) -> Self {
        Self {
            storage,
            notifications,
        }
    }

    /// Propose swapping two toys between their owners
    pub async fn propose(
        &self,
        requester: &str,
        idempotency_token: &str,
        request: &ProposeExchangeRequest,
    ) -> AppResult<Exchange> {
        if idempotency_token.trim().is_empty() {
            return Err(validation_error("Idempotency token is required"));
        }
        if let Some(existing) = self.storage.select_exchange_by_token(idempotency_token).await? {
            debug!(exchange_id = %existing.exchange_id, "Exchange token replayed");
            return Ok(existing);
        }

        let (a, b) = (&request.user_toy_1, &request.user_toy_2);
        if a.user_id == b.user_id {
            return Err(validation_error("Cannot exchange toys with yourself"));
        }
        if requester != a.user_id && requester != b.user_id {
            return Err(validation_error(
                "The requesting user must be one of the participants",
            ));
        }

        let exchange = Exchange::new(&a.toy_id, &b.toy_id, idempotency_token);
        let details = [
            ExchangeDetails::new(&exchange.exchange_id, a),
            ExchangeDetails::new(&exchange.exchange_id, b),
        ];
        let stored = self.storage.create_exchange(exchange, details).await?;

        info!(
            exchange_id = %stored.exchange_id,
            src_toy_id = %stored.src_toy_id,
            dst_toy_id = %stored.dst_toy_id,
            "Exchange proposed"
        );
        Ok(stored)
    }

    pub async fn get(&self, exchange_id: &str) -> AppResult<ExchangeView> {
        let rows = self
            .storage
            .select_exchange_rows(&[exchange_id.to_string()])
            .await?;
        ExchangeView::from_rows(&rows)
            .ok_or_else(|| not_found_error(format!("Exchange {} not found", exchange_id)))
    }

    /// Move the caller's side of an exchange and return the fresh view
    pub async fn transition(
        &self,
        exchange_id: &str,
        user_id: &str,
        target: ParticipantStatus,
    ) -> AppResult<ExchangeView> {
        let caller = user_id.to_string();
        let planner = move |details: &[ExchangeDetails]| plan_transition(details, &caller, target);

        let (plan, rows) = self
            .storage
            .transition_participant(exchange_id, &planner)
            .await?;
        let view = ExchangeView::from_rows(&rows)
            .ok_or_else(|| not_found_error(format!("Exchange {} not found", exchange_id)))?;

        if plan.is_noop() {
            debug!(exchange_id, user_id, status = %target, "Participant status unchanged");
        } else {
            info!(
                exchange_id,
                user_id,
                status = %target,
                exchange_status = %plan.exchange_status,
                "Participant status changed"
            );
        }

        if !plan.is_noop() && plan.exchange_status == ExchangeStatus::Confirm {
            self.notify_confirmed(&view).await;
        }

        Ok(view)
    }

    /// Queue a notice for each participant. Failures are only logged.
    async fn notify_confirmed(&self, view: &ExchangeView) {
        let mut users = Vec::with_capacity(view.participants.len());
        for participant in &view.participants {
            match self.storage.select_user(&participant.toy.user_id).await {
                Ok(Some(user)) => users.push(user),
                Ok(None) => {
                    warn!(user_id = %participant.toy.user_id, "Participant vanished, skipping notice");
                    return;
                }
                Err(e) => {
                    warn!(exchange_id = %view.exchange_id, error = %e, "Could not load participants for notice");
                    return;
                }
            }
        }

        if let [first, second] = users.as_slice() {
            for (recipient, partner) in [(first, second), (second, first)] {
                self.notifications
                    .enqueue(confirmation_notice(&view.exchange_id, recipient, partner));
            }
        }
    }

    /// One page of the exchanges `user_id` takes part in
    pub async fn list(
        &self,
        user_id: &str,
        request: &ExchangeListRequest,
    ) -> AppResult<ListResponse<ExchangeView>> {
        let page = PageRequest::new(request.cursor.as_deref(), request.limit)?;

        let ids = self
            .storage
            .list_exchange_ids(
                user_id,
                request.query.statuses.as_deref(),
                page.after.as_deref(),
                page.fetch_limit(),
            )
            .await?;
        let (ids, cursor) = split_page(ids, page.limit, |id| id.as_str());

        let rows = self.storage.select_exchange_rows(&ids).await?;
        let mut grouped: HashMap<String, Vec<ExchangeParticipant>> = HashMap::new();
        for row in rows {
            grouped.entry(row.exchange_id.clone()).or_default().push(row);
        }

        let items = ids
            .iter()
            .filter_map(|id| grouped.get(id))
            .filter_map(|rows| ExchangeView::from_rows(rows))
            .collect();

        Ok(ListResponse { items, cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStorage;
    use crate::models::{ExchangeQuery, Toy, UserName, UserToy};
    use crate::notify::testing::RecordingNotifier;
    use crate::notify::RetryPolicy;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    struct Fixture {
        storage: Arc<MemoryStorage>,
        notifier: Arc<RecordingNotifier>,
        engine: ExchangeEngine,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        for (id, first) in [("u1", "Anna"), ("u2", "Boris"), ("u3", "Clara")] {
            let mut user = User::new(
                UserName {
                    first_name: first.into(),
                    last_name: "Smith".into(),
                    middle_name: None,
                },
                format!("{}@example.com", id),
                "hash".into(),
            );
            user.user_id = id.into();
            storage.insert_user(user).await.unwrap();
        }
        for (owner, toy_id) in [("u1", "t1"), ("u2", "t2"), ("u1", "t3"), ("u3", "t4")] {
            let mut toy = Toy::new(owner, format!("toy {}", toy_id), None, None, toy_id);
            toy.toy_id = toy_id.into();
            storage.insert_toy(toy).await.unwrap();
        }

        let notifier = Arc::new(RecordingNotifier::default());
        let queue = NotificationQueue::start(
            notifier.clone(),
            RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::ZERO,
                max_jitter: Duration::ZERO,
            },
            16,
        );
        let engine = ExchangeEngine::new(storage.clone(), queue);
        Fixture {
            storage,
            notifier,
            engine,
        }
    }

    fn request(a: (&str, &str), b: (&str, &str)) -> ProposeExchangeRequest {
        ProposeExchangeRequest {
            user_toy_1: UserToy::new(a.0, a.1),
            user_toy_2: UserToy::new(b.0, b.1),
        }
    }

    fn details(a: ParticipantStatus, b: ParticipantStatus) -> Vec<ExchangeDetails> {
        let mut first = ExchangeDetails::new("ex", &UserToy::new("u1", "t1"));
        first.status = a;
        let mut second = ExchangeDetails::new("ex", &UserToy::new("u2", "t2"));
        second.status = b;
        vec![first, second]
    }

    #[test]
    fn test_plan_first_confirmation() {
        use ParticipantStatus::*;
        let plan = plan_transition(&details(Created, Created), "u1", Confirm1).unwrap();
        assert_eq!(plan.previous_status, ExchangeStatus::Created);
        assert_eq!(plan.exchange_status, ExchangeStatus::Created);
        assert_eq!(plan.updates, vec![("u1".to_string(), Confirm1)]);
    }

    #[test]
    fn test_plan_promotes_both_on_success() {
        use ParticipantStatus::*;
        let plan = plan_transition(&details(Confirm1, Confirm2), "u1", Confirm2).unwrap();
        assert_eq!(plan.exchange_status, ExchangeStatus::Success);
        assert_eq!(
            plan.updates,
            vec![("u1".to_string(), Success), ("u2".to_string(), Success)]
        );
    }

    #[test]
    fn test_plan_rejects_outsiders_and_frozen_exchanges() {
        use ParticipantStatus::*;
        let err = plan_transition(&details(Created, Created), "u9", Confirm1).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = plan_transition(&details(Failed, Created), "u2", Confirm1).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = plan_transition(&details(Created, Created), "u1", Confirm2).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_plan_repeat_is_noop() {
        use ParticipantStatus::*;
        let plan = plan_transition(&details(Confirm1, Created), "u1", Confirm1).unwrap();
        assert!(plan.is_noop());
    }

    #[test]
    fn test_plan_needs_two_rows() {
        let mut rows = details(ParticipantStatus::Created, ParticipantStatus::Created);
        rows.pop();
        let err = plan_transition(&rows, "u1", ParticipantStatus::Confirm1).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn test_propose_is_idempotent() {
        let fx = fixture().await;
        let req = request(("u1", "t1"), ("u2", "t2"));

        let first = fx.engine.propose("u1", "ex-tk", &req).await.unwrap();
        let second = fx.engine.propose("u1", "ex-tk", &req).await.unwrap();
        assert_eq!(first, second);

        let page = fx
            .engine
            .list("u1", &ExchangeListRequest::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn test_propose_rejects_self_exchange() {
        let fx = fixture().await;
        let err = fx
            .engine
            .propose("u1", "tk", &request(("u1", "t1"), ("u1", "t3")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_propose_checks_ownership_and_requester() {
        let fx = fixture().await;

        // t2 belongs to u2, not u3
        let err = fx
            .engine
            .propose("u1", "tk", &request(("u1", "t1"), ("u3", "t2")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = fx
            .engine
            .propose("u3", "tk", &request(("u1", "t1"), ("u2", "t2")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        assert!(fx.storage.select_exchange_by_token("tk").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_propose_rejects_toy_in_active_exchange() {
        let fx = fixture().await;
        assert_ok!(
            fx.engine
                .propose("u1", "tk-1", &request(("u1", "t1"), ("u2", "t2")))
                .await
        );

        let err = fx
            .engine
            .propose("u3", "tk-2", &request(("u1", "t1"), ("u3", "t4")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(fx.storage.select_exchange_by_token("tk-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_exchange_releases_toys() {
        let fx = fixture().await;
        let first = fx
            .engine
            .propose("u1", "tk-1", &request(("u1", "t1"), ("u2", "t2")))
            .await
            .unwrap();
        fx.engine
            .transition(&first.exchange_id, "u2", ParticipantStatus::Failed)
            .await
            .unwrap();

        assert_ok!(
            fx.engine
                .propose("u3", "tk-2", &request(("u1", "t1"), ("u3", "t4")))
                .await
        );
    }

    #[tokio::test]
    async fn test_propose_is_atomic_on_details_failure() {
        let fx = fixture().await;
        fx.storage.fail_details_insert(true);

        assert_err!(
            fx.engine
                .propose("u1", "ex-tk", &request(("u1", "t1"), ("u2", "t2")))
                .await
        );
        assert!(fx.storage.select_exchange_by_token("ex-tk").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transition_round_trip() {
        let fx = fixture().await;
        let exchange = fx
            .engine
            .propose("u1", "tk", &request(("u1", "t1"), ("u2", "t2")))
            .await
            .unwrap();

        fx.engine
            .transition(&exchange.exchange_id, "u1", ParticipantStatus::Confirm1)
            .await
            .unwrap();
        let view = fx.engine.get(&exchange.exchange_id).await.unwrap();

        assert_eq!(view.participant("u1").unwrap().status, ParticipantStatus::Confirm1);
        assert_eq!(view.participant("u2").unwrap().status, ParticipantStatus::Created);
        assert_eq!(view.status, ExchangeStatus::Created);
    }

    #[tokio::test]
    async fn test_full_negotiation_notifies_on_each_confirm_change() {
        let fx = fixture().await;
        let id = fx
            .engine
            .propose("u1", "tk", &request(("u1", "t1"), ("u2", "t2")))
            .await
            .unwrap()
            .exchange_id;

        fx.engine.transition(&id, "u1", ParticipantStatus::Confirm1).await.unwrap();
        assert!(fx.notifier.settled(0).await.is_empty());

        let view = fx.engine.transition(&id, "u2", ParticipantStatus::Confirm1).await.unwrap();
        assert_eq!(view.status, ExchangeStatus::Confirm);
        let sent = fx.notifier.settled(2).await;
        assert_eq!(sent.len(), 2);
        let to_anna = sent.iter().find(|n| n.user_id == "u1").unwrap();
        assert!(to_anna.body.contains("Smith Boris"));
        assert!(to_anna.body.contains("u2@example.com"));

        // Second confirmation keeps the exchange in `confirm`
        let view = fx.engine.transition(&id, "u1", ParticipantStatus::Confirm2).await.unwrap();
        assert_eq!(view.status, ExchangeStatus::Confirm);
        assert_eq!(fx.notifier.settled(4).await.len(), 4);

        // A replayed status changes nothing and stays silent
        let view = fx.engine.transition(&id, "u1", ParticipantStatus::Confirm2).await.unwrap();
        assert_eq!(view.status, ExchangeStatus::Confirm);
        assert_eq!(fx.notifier.settled(4).await.len(), 4);

        let view = fx.engine.transition(&id, "u2", ParticipantStatus::Confirm2).await.unwrap();
        assert_eq!(view.status, ExchangeStatus::Success);
        assert!(view
            .participants
            .iter()
            .all(|p| p.status == ParticipantStatus::Success));
        assert_eq!(fx.notifier.settled(4).await.len(), 4);

        // Frozen after success
        let err = fx
            .engine
            .transition(&id, "u1", ParticipantStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_transition_by_outsider_is_not_found() {
        let fx = fixture().await;
        let id = fx
            .engine
            .propose("u1", "tk", &request(("u1", "t1"), ("u2", "t2")))
            .await
            .unwrap()
            .exchange_id;

        let err = fx
            .engine
            .transition(&id, "u3", ParticipantStatus::Confirm1)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = fx
            .engine
            .transition("missing", "u1", ParticipantStatus::Confirm1)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        let fx = fixture().await;
        // u1 takes part in two exchanges, one of them failed
        let failed = fx
            .engine
            .propose("u1", "tk-1", &request(("u1", "t1"), ("u2", "t2")))
            .await
            .unwrap();
        fx.engine
            .transition(&failed.exchange_id, "u1", ParticipantStatus::Failed)
            .await
            .unwrap();
        fx.engine
            .propose("u1", "tk-2", &request(("u1", "t3"), ("u3", "t4")))
            .await
            .unwrap();

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = fx
                .engine
                .list(
                    "u1",
                    &ExchangeListRequest {
                        limit: Some(1),
                        cursor: cursor.clone(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            seen.extend(page.items.into_iter().map(|v| v.exchange_id));
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        let mut expected = seen.clone();
        expected.sort();
        assert_eq!(seen, expected);
        assert_eq!(seen.len(), 2);

        let only_failed = fx
            .engine
            .list(
                "u1",
                &ExchangeListRequest {
                    query: ExchangeQuery {
                        statuses: Some(vec![ExchangeStatus::Failed]),
                    },
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(only_failed.items.len(), 1);
        assert_eq!(only_failed.items[0].exchange_id, failed.exchange_id);

        let none_for_u2 = fx
            .engine
            .list(
                "u2",
                &ExchangeListRequest {
                    query: ExchangeQuery {
                        statuses: Some(vec![ExchangeStatus::Created]),
                    },
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(none_for_u2.items.is_empty());
        assert!(none_for_u2.cursor.is_none());
    }
}
