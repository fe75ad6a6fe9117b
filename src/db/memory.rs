//! In-process storage backend
//!
//! Keeps every table behind one `RwLock`, so a write guard plays the part of
//! a transaction: a write that fails halfway undoes its rows before the
//! guard is released.

use super::{unowned_toy, ParticipantTransition, Storage, TransitionPlanner};
use crate::error::{conflict_error, not_found_error, AppError, AppResult};
use crate::models::{
    Exchange, ExchangeDetails, ExchangeParticipant, ExchangeStatus, Toy, ToyChanges, ToyQuery,
    ToyStatus, User,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    toys: HashMap<String, Toy>,
    exchanges: HashMap<String, Exchange>,
    details: Vec<ExchangeDetails>,
}

impl Tables {
    fn live_toy(&self, toy_id: &str) -> Option<&Toy> {
        self.toys
            .get(toy_id)
            .filter(|toy| toy.status != ToyStatus::Removed)
    }

    fn owned_live_toy_mut(&mut self, toy_id: &str, owner: &str) -> Option<&mut Toy> {
        self.toys
            .get_mut(toy_id)
            .filter(|toy| toy.user_id == owner && toy.status != ToyStatus::Removed)
    }

    fn participant_rows(&self, exchange_id: &str) -> Vec<ExchangeParticipant> {
        let Some(exchange) = self.exchanges.get(exchange_id) else {
            return Vec::new();
        };

        let mut details: Vec<&ExchangeDetails> = self
            .details
            .iter()
            .filter(|d| d.exchange_id == exchange_id)
            .collect();
        details.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        details
            .into_iter()
            .filter_map(|detail| {
                let toy = self.toys.get(&detail.toy_id)?;
                let user = self.users.get(&detail.user_id)?;
                Some(ExchangeParticipant {
                    exchange_id: exchange.exchange_id.clone(),
                    exchange_status: exchange.status,
                    idempotency_token: exchange.idempotency_token.clone(),
                    src_toy_id: exchange.src_toy_id.clone(),
                    dst_toy_id: exchange.dst_toy_id.clone(),
                    exchange_created_at: exchange.created_at,
                    exchange_updated_at: exchange.updated_at,
                    toy_id: toy.toy_id.clone(),
                    toy_name: toy.name.clone(),
                    toy_description: toy.description.clone(),
                    toy_photo_url: toy.photo_url.clone(),
                    user_id: user.user_id.clone(),
                    first_name: user.name.first_name.clone(),
                    middle_name: user.name.middle_name.clone(),
                    last_name: user.name.last_name.clone(),
                    participant_status: detail.status,
                })
            })
            .collect()
    }
}

/// Storage kept in process memory
#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
    fail_details_insert: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make exchange proposals fail after the exchange row and the first
    /// participant row were written
    pub fn fail_details_insert(&self, fail: bool) {
        self.fail_details_insert.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn insert_toy(&self, toy: Toy) -> AppResult<Toy> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .toys
            .values()
            .find(|t| t.idempotency_token == toy.idempotency_token)
        {
            return Ok(existing.clone());
        }
        tables.toys.insert(toy.toy_id.clone(), toy.clone());
        Ok(toy)
    }

    async fn select_toy_by_token(&self, token: &str) -> AppResult<Option<Toy>> {
        let tables = self.tables.read().await;
        Ok(tables
            .toys
            .values()
            .find(|t| t.idempotency_token == token)
            .cloned())
    }

    async fn select_toy(&self, toy_id: &str) -> AppResult<Option<Toy>> {
        let tables = self.tables.read().await;
        Ok(tables.live_toy(toy_id).cloned())
    }

    async fn select_toy_by_owner(&self, toy_id: &str, owner: &str) -> AppResult<Option<Toy>> {
        let tables = self.tables.read().await;
        Ok(tables
            .live_toy(toy_id)
            .filter(|toy| toy.user_id == owner)
            .cloned())
    }

    async fn update_toy(
        &self,
        toy_id: &str,
        owner: &str,
        changes: &ToyChanges,
    ) -> AppResult<Option<Toy>> {
        let mut tables = self.tables.write().await;
        Ok(tables.owned_live_toy_mut(toy_id, owner).map(|toy| {
            toy.name = changes.name.clone();
            toy.description = changes.description.clone();
            if let Some(photo_url) = &changes.photo_url {
                toy.photo_url = Some(photo_url.clone());
            }
            toy.updated_at = Utc::now();
            toy.clone()
        }))
    }

    async fn update_toy_status(
        &self,
        toy_id: &str,
        owner: &str,
        status: ToyStatus,
    ) -> AppResult<Option<Toy>> {
        let mut tables = self.tables.write().await;
        Ok(tables.owned_live_toy_mut(toy_id, owner).map(|toy| {
            toy.status = status;
            toy.updated_at = Utc::now();
            toy.clone()
        }))
    }

    async fn list_toys(
        &self,
        query: &ToyQuery,
        after: Option<&str>,
        limit: i64,
    ) -> AppResult<Vec<Toy>> {
        let tables = self.tables.read().await;
        let mut toys: Vec<Toy> = tables
            .toys
            .values()
            .filter(|toy| query.matches(toy))
            .filter(|toy| after.map_or(true, |key| toy.toy_id.as_str() >= key))
            .cloned()
            .collect();
        toys.sort_by(|a, b| {
            a.toy_id
                .cmp(&b.toy_id)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
        });
        toys.truncate(limit.max(0) as usize);
        Ok(toys)
    }

    async fn create_exchange(
        &self,
        exchange: Exchange,
        details: [ExchangeDetails; 2],
    ) -> AppResult<Exchange> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables
            .exchanges
            .values()
            .find(|e| e.idempotency_token == exchange.idempotency_token)
        {
            return Ok(existing.clone());
        }

        for detail in &details {
            let owned = tables
                .live_toy(&detail.toy_id)
                .is_some_and(|toy| toy.user_id == detail.user_id);
            if !owned {
                return Err(unowned_toy(detail));
            }
        }

        let busy = tables.details.iter().find(|d| {
            details.iter().any(|new| new.toy_id == d.toy_id)
                && tables
                    .exchanges
                    .get(&d.exchange_id)
                    .is_some_and(|e| e.status.is_active())
        });
        if let Some(busy) = busy {
            return Err(conflict_error(format!(
                "Toy {} is already part of an active exchange",
                busy.toy_id
            )));
        }

        let committed_details = tables.details.len();
        tables
            .exchanges
            .insert(exchange.exchange_id.clone(), exchange.clone());

        for (written, detail) in details.into_iter().enumerate() {
            if written > 0 && self.fail_details_insert.load(Ordering::SeqCst) {
                // Roll back the exchange row and the participant already written
                tables.details.truncate(committed_details);
                tables.exchanges.remove(&exchange.exchange_id);
                return Err(AppError::Internal(
                    "failed to insert exchange details".to_string(),
                ));
            }
            tables.details.push(detail);
        }
        Ok(exchange)
    }

    async fn select_exchange_by_token(&self, token: &str) -> AppResult<Option<Exchange>> {
        let tables = self.tables.read().await;
        Ok(tables
            .exchanges
            .values()
            .find(|e| e.idempotency_token == token)
            .cloned())
    }

    async fn select_exchange_rows(
        &self,
        exchange_ids: &[String],
    ) -> AppResult<Vec<ExchangeParticipant>> {
        let tables = self.tables.read().await;
        let mut ids: Vec<&String> = exchange_ids.iter().collect();
        ids.sort();
        ids.dedup();
        Ok(ids
            .into_iter()
            .flat_map(|id| tables.participant_rows(id))
            .collect())
    }

    async fn transition_participant(
        &self,
        exchange_id: &str,
        planner: &TransitionPlanner,
    ) -> AppResult<(ParticipantTransition, Vec<ExchangeParticipant>)> {
        let mut tables = self.tables.write().await;

        if !tables.exchanges.contains_key(exchange_id) {
            return Err(not_found_error(format!("Exchange {} not found", exchange_id)));
        }

        let mut details: Vec<ExchangeDetails> = tables
            .details
            .iter()
            .filter(|d| d.exchange_id == exchange_id)
            .cloned()
            .collect();
        details.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        let plan = planner(details.as_slice())?;
        let now = Utc::now();

        for (user_id, status) in &plan.updates {
            if let Some(detail) = tables
                .details
                .iter_mut()
                .find(|d| d.exchange_id == exchange_id && &d.user_id == user_id)
            {
                detail.status = *status;
                detail.updated_at = now;
            }
        }
        if plan.exchange_status != plan.previous_status {
            if let Some(exchange) = tables.exchanges.get_mut(exchange_id) {
                exchange.status = plan.exchange_status;
                exchange.updated_at = now;
            }
        }

        let rows = tables.participant_rows(exchange_id);
        Ok((plan, rows))
    }

    async fn list_exchange_ids(
        &self,
        user_id: &str,
        statuses: Option<&[ExchangeStatus]>,
        after: Option<&str>,
        limit: i64,
    ) -> AppResult<Vec<String>> {
        let tables = self.tables.read().await;
        let mut exchanges: Vec<&Exchange> = tables
            .details
            .iter()
            .filter(|d| d.user_id == user_id)
            .filter_map(|d| tables.exchanges.get(&d.exchange_id))
            .filter(|e| statuses.map_or(true, |s| s.contains(&e.status)))
            .filter(|e| after.map_or(true, |key| e.exchange_id.as_str() >= key))
            .collect();
        exchanges.sort_by(|a, b| {
            a.exchange_id
                .cmp(&b.exchange_id)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
        });
        exchanges.dedup_by(|a, b| a.exchange_id == b.exchange_id);

        Ok(exchanges
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|e| e.exchange_id.clone())
            .collect())
    }

    async fn insert_user(&self, user: User) -> AppResult<User> {
        let mut tables = self.tables.write().await;

        // Check if email already exists
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(conflict_error("Email already registered"));
        }
        tables.users.insert(user.user_id.clone(), user.clone());
        Ok(user)
    }

    async fn select_user(&self, user_id: &str) -> AppResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(user_id).cloned())
    }

    async fn select_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }
}
