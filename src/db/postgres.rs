//! PostgreSQL storage backend

use super::queries;
use super::{unowned_toy, ParticipantTransition, Storage, TransitionPlanner};
use crate::error::{conflict_error, not_found_error, AppError, AppResult};
use crate::models::{
    Exchange, ExchangeDetails, ExchangeParticipant, ExchangeStatus, Toy, ToyChanges, ToyQuery,
    ToyStatus, UnknownStatus, User, UserName,
};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use tracing::{debug, warn};

/// Storage backed by a deadpool-postgres pool
pub struct PgStorage {
    pool: Pool,
    timeout: Duration,
}

impl PgStorage {
    pub fn new(pool: Pool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Bound a storage call by the configured budget
    async fn timed<T, F>(&self, op: &'static str, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout_ms = self.timeout.as_millis() as u64, "Storage call timed out");
                Err(AppError::Timeout(op.to_string()))
            }
        }
    }

    async fn query_toy(&self, sql: &str, params: &[&(dyn tokio_postgres::types::ToSql + Sync)])
        -> AppResult<Option<Toy>>
    {
        let client = self.pool.get().await?;
        let row = client.query_opt(sql, params).await?;
        row.as_ref().map(toy_from_row).transpose()
    }

    async fn query_user(&self, sql: &str, key: &str) -> AppResult<Option<User>> {
        let client = self.pool.get().await?;
        let row = client.query_opt(sql, &[&key]).await?;
        row.as_ref().map(user_from_row).transpose()
    }
}

fn parse_status<T: FromStr<Err = UnknownStatus>>(value: &str) -> AppResult<T> {
    value
        .parse()
        .map_err(|e: UnknownStatus| AppError::Internal(e.to_string()))
}

fn toy_from_row(row: &Row) -> AppResult<Toy> {
    Ok(Toy {
        toy_id: row.get(0),
        user_id: row.get(1),
        name: row.get(2),
        description: row.get(3),
        photo_url: row.get(4),
        idempotency_token: row.get(5),
        status: parse_status(row.get(6))?,
        created_at: row.get(7),
        updated_at: row.get(8),
    })
}

fn exchange_from_row(row: &Row) -> AppResult<Exchange> {
    Ok(Exchange {
        exchange_id: row.get(0),
        src_toy_id: row.get(1),
        dst_toy_id: row.get(2),
        idempotency_token: row.get(3),
        status: parse_status(row.get(4))?,
        created_at: row.get(5),
        updated_at: row.get(6),
    })
}

fn details_from_row(row: &Row) -> AppResult<ExchangeDetails> {
    Ok(ExchangeDetails {
        exchange_id: row.get(0),
        toy_id: row.get(1),
        user_id: row.get(2),
        status: parse_status(row.get(3))?,
        created_at: row.get(4),
        updated_at: row.get(5),
    })
}

fn participant_from_row(row: &Row) -> AppResult<ExchangeParticipant> {
    Ok(ExchangeParticipant {
        exchange_id: row.get(0),
        exchange_status: parse_status(row.get(1))?,
        idempotency_token: row.get(2),
        src_toy_id: row.get(3),
        dst_toy_id: row.get(4),
        exchange_created_at: row.get(5),
        exchange_updated_at: row.get(6),
        toy_id: row.get(7),
        toy_name: row.get(8),
        toy_description: row.get(9),
        toy_photo_url: row.get(10),
        user_id: row.get(11),
        first_name: row.get(12),
        middle_name: row.get(13),
        last_name: row.get(14),
        participant_status: parse_status(row.get(15))?,
    })
}

fn user_from_row(row: &Row) -> AppResult<User> {
    Ok(User {
        user_id: row.get(0),
        name: UserName {
            first_name: row.get(1),
            last_name: row.get(2),
            middle_name: row.get(3),
        },
        email: row.get(4),
        password_hash: row.get(5),
        created_at: row.get(6),
        updated_at: row.get(7),
    })
}

fn status_strings<T: ToString>(statuses: &[T]) -> Vec<String> {
    statuses.iter().map(ToString::to_string).collect()
}

#[async_trait]
impl Storage for PgStorage {
    async fn ping(&self) -> AppResult<()> {
        self.timed("ping", async {
            let client = self.pool.get().await?;
            client.query_one("SELECT 1", &[]).await?;
            Ok(())
        })
        .await
    }

    async fn insert_toy(&self, toy: Toy) -> AppResult<Toy> {
        self.timed("insert_toy", async {
            let client = self.pool.get().await?;
            let row = client
                .query_one(
                    queries::UPSERT_TOY,
                    &[
                        &toy.toy_id,
                        &toy.user_id,
                        &toy.name,
                        &toy.description,
                        &toy.photo_url,
                        &toy.idempotency_token,
                        &toy.status.as_str(),
                        &toy.created_at,
                        &toy.updated_at,
                    ],
                )
                .await?;
            toy_from_row(&row)
        })
        .await
    }

    async fn select_toy_by_token(&self, token: &str) -> AppResult<Option<Toy>> {
        self.timed(
            "select_toy_by_token",
            self.query_toy(queries::SELECT_TOY_BY_TOKEN, &[&token]),
        )
        .await
    }

    async fn select_toy(&self, toy_id: &str) -> AppResult<Option<Toy>> {
        self.timed("select_toy", self.query_toy(queries::SELECT_TOY, &[&toy_id]))
            .await
    }

    async fn select_toy_by_owner(&self, toy_id: &str, owner: &str) -> AppResult<Option<Toy>> {
        self.timed(
            "select_toy_by_owner",
            self.query_toy(queries::SELECT_TOY_BY_OWNER, &[&toy_id, &owner]),
        )
        .await
    }

    async fn update_toy(
        &self,
        toy_id: &str,
        owner: &str,
        changes: &ToyChanges,
    ) -> AppResult<Option<Toy>> {
        self.timed(
            "update_toy",
            self.query_toy(
                queries::UPDATE_TOY,
                &[
                    &toy_id,
                    &owner,
                    &changes.name,
                    &changes.description,
                    &changes.photo_url,
                ],
            ),
        )
        .await
    }

    async fn update_toy_status(
        &self,
        toy_id: &str,
        owner: &str,
        status: ToyStatus,
    ) -> AppResult<Option<Toy>> {
        self.timed(
            "update_toy_status",
            self.query_toy(
                queries::UPDATE_TOY_STATUS,
                &[&toy_id, &owner, &status.as_str()],
            ),
        )
        .await
    }

    async fn list_toys(
        &self,
        query: &ToyQuery,
        after: Option<&str>,
        limit: i64,
    ) -> AppResult<Vec<Toy>> {
        let statuses = match &query.statuses {
            Some(statuses) => status_strings(statuses),
            None => status_strings(&[ToyStatus::Created, ToyStatus::Exchanging]),
        };

        self.timed("list_toys", async {
            let client = self.pool.get().await?;
            let rows = client
                .query(
                    queries::LIST_TOYS,
                    &[
                        &statuses,
                        &query.user_ids,
                        &query.exclude_user_ids,
                        &after,
                        &limit,
                    ],
                )
                .await?;
            rows.iter().map(toy_from_row).collect()
        })
        .await
    }

    async fn create_exchange(
        &self,
        exchange: Exchange,
        details: [ExchangeDetails; 2],
    ) -> AppResult<Exchange> {
        self.timed("create_exchange", async {
            let mut client = self.pool.get().await?;
            let tx = client.transaction().await?;

            let row = tx
                .query_one(
                    queries::UPSERT_EXCHANGE,
                    &[
                        &exchange.exchange_id,
                        &exchange.src_toy_id,
                        &exchange.dst_toy_id,
                        &exchange.idempotency_token,
                        &exchange.status.as_str(),
                        &exchange.created_at,
                        &exchange.updated_at,
                    ],
                )
                .await?;
            let stored = exchange_from_row(&row)?;
            let inserted: bool = row.get(7);

            if !inserted {
                debug!(exchange_id = %stored.exchange_id, "Exchange token replayed");
                tx.commit().await?;
                return Ok(stored);
            }

            let toy_ids = vec![details[0].toy_id.clone(), details[1].toy_id.clone()];
            let owners: Vec<(String, String)> = tx
                .query(queries::LOCK_TOYS, &[&toy_ids])
                .await?
                .iter()
                .map(|row| (row.get(0), row.get(1)))
                .collect();
            for detail in &details {
                let owned = owners.iter().any(|(toy_id, user_id)| {
                    *toy_id == detail.toy_id && *user_id == detail.user_id
                });
                if !owned {
                    return Err(unowned_toy(detail));
                }
            }

            if let Some(busy) = tx
                .query_opt(queries::TOY_IN_ACTIVE_EXCHANGE, &[&toy_ids, &stored.exchange_id])
                .await?
            {
                let toy_id: String = busy.get(0);
                // Dropping the transaction rolls it back
                return Err(conflict_error(format!(
                    "Toy {} is already part of an active exchange",
                    toy_id
                )));
            }

            for detail in &details {
                tx.execute(
                    queries::INSERT_EXCHANGE_DETAILS,
                    &[
                        &stored.exchange_id,
                        &detail.toy_id,
                        &detail.user_id,
                        &detail.status.as_str(),
                        &detail.created_at,
                        &detail.updated_at,
                    ],
                )
                .await?;
            }

            tx.commit().await?;
            Ok(stored)
        })
        .await
    }

    async fn select_exchange_by_token(&self, token: &str) -> AppResult<Option<Exchange>> {
        self.timed("select_exchange_by_token", async {
            let client = self.pool.get().await?;
            let row = client
                .query_opt(queries::SELECT_EXCHANGE_BY_TOKEN, &[&token])
                .await?;
            row.as_ref().map(exchange_from_row).transpose()
        })
        .await
    }

    async fn select_exchange_rows(
        &self,
        exchange_ids: &[String],
    ) -> AppResult<Vec<ExchangeParticipant>> {
        if exchange_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.timed("select_exchange_rows", async {
            let client = self.pool.get().await?;
            let rows = client
                .query(queries::SELECT_EXCHANGE_ROWS, &[&exchange_ids])
                .await?;
            rows.iter().map(participant_from_row).collect()
        })
        .await
    }

    async fn transition_participant(
        &self,
        exchange_id: &str,
        planner: &TransitionPlanner,
    ) -> AppResult<(ParticipantTransition, Vec<ExchangeParticipant>)> {
        self.timed("transition_participant", async {
            let mut client = self.pool.get().await?;

            let plan = {
                let tx = client.transaction().await?;

                if tx.query_opt(queries::LOCK_EXCHANGE, &[&exchange_id]).await?.is_none() {
                    return Err(not_found_error(format!("Exchange {} not found", exchange_id)));
                }
                let details = tx
                    .query(queries::SELECT_DETAILS_FOR_UPDATE, &[&exchange_id])
                    .await?
                    .iter()
                    .map(details_from_row)
                    .collect::<AppResult<Vec<_>>>()?;

                let plan = planner(details.as_slice())?;

                for (user_id, status) in &plan.updates {
                    tx.execute(
                        queries::UPDATE_DETAILS_STATUS,
                        &[&exchange_id, user_id, &status.as_str()],
                    )
                    .await?;
                }
                if plan.exchange_status != plan.previous_status {
                    tx.execute(
                        queries::UPDATE_EXCHANGE_STATUS,
                        &[&exchange_id, &plan.exchange_status.as_str()],
                    )
                    .await?;
                }

                tx.commit().await?;
                plan
            };

            let ids = vec![exchange_id.to_string()];
            let rows = client
                .query(queries::SELECT_EXCHANGE_ROWS, &[&ids])
                .await?
                .iter()
                .map(participant_from_row)
                .collect::<AppResult<Vec<_>>>()?;

            Ok((plan, rows))
        })
        .await
    }

    async fn list_exchange_ids(
        &self,
        user_id: &str,
        statuses: Option<&[ExchangeStatus]>,
        after: Option<&str>,
        limit: i64,
    ) -> AppResult<Vec<String>> {
        let statuses = statuses.map(status_strings);

        self.timed("list_exchange_ids", async {
            let client = self.pool.get().await?;
            let rows = client
                .query(
                    queries::LIST_EXCHANGE_IDS,
                    &[&user_id, &statuses, &after, &limit],
                )
                .await?;
            Ok(rows.iter().map(|row| row.get(0)).collect())
        })
        .await
    }

    async fn insert_user(&self, user: User) -> AppResult<User> {
        self.timed("insert_user", async {
            let client = self.pool.get().await?;
            let result = client
                .query_one(
                    queries::INSERT_USER,
                    &[
                        &user.user_id,
                        &user.name.first_name,
                        &user.name.last_name,
                        &user.name.middle_name,
                        &user.email,
                        &user.password_hash,
                        &user.created_at,
                        &user.updated_at,
                    ],
                )
                .await;

            match result {
                Ok(row) => user_from_row(&row),
                Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                    Err(conflict_error("Email already registered"))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn select_user(&self, user_id: &str) -> AppResult<Option<User>> {
        self.timed("select_user", self.query_user(queries::SELECT_USER, user_id))
            .await
    }

    async fn select_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.timed(
            "select_user_by_email",
            self.query_user(queries::SELECT_USER_BY_EMAIL, email),
        )
        .await
    }
}
