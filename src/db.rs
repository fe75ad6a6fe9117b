//! Persistence layer
//!
//! Everything above this module talks to a `Storage` trait object. `PgStorage`
//! is the durable backend, `MemoryStorage` keeps the same contract in process.

mod memory;
mod postgres;
pub mod queries;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

use crate::config::DatabaseConfig;
use crate::error::{validation_error, AppError, AppResult};
use crate::models::{
    Exchange, ExchangeDetails, ExchangeParticipant, ExchangeStatus, ParticipantStatus, Toy,
    ToyChanges, ToyQuery, ToyStatus, User,
};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::info;

/// Outcome of planning a participant transition against the locked rows
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantTransition {
    /// Aggregate status before the change
    pub previous_status: ExchangeStatus,
    /// Aggregate status after the change
    pub exchange_status: ExchangeStatus,
    /// Participant rows to rewrite; empty for a no-op
    pub updates: Vec<(String, ParticipantStatus)>,
}

impl ParticipantTransition {
    pub fn is_noop(&self) -> bool {
        self.updates.is_empty() && self.previous_status == self.exchange_status
    }
}

/// Pure decision run by storage while the participant rows are locked
pub type TransitionPlanner =
    dyn Fn(&[ExchangeDetails]) -> AppResult<ParticipantTransition> + Send + Sync;

/// Rejection for a participant row whose toy is gone or owned by someone else
fn unowned_toy(detail: &ExchangeDetails) -> AppError {
    validation_error(format!(
        "Toy {} does not exist or is not owned by user {}",
        detail.toy_id, detail.user_id
    ))
}

/// Capability set every persistence backend provides
#[async_trait]
pub trait Storage: Send + Sync {
    async fn ping(&self) -> AppResult<()>;

    // Toys

    /// Insert a toy, or return the row already recorded for its token
    async fn insert_toy(&self, toy: Toy) -> AppResult<Toy>;
    async fn select_toy_by_token(&self, token: &str) -> AppResult<Option<Toy>>;
    /// Point lookup that never returns removed toys
    async fn select_toy(&self, toy_id: &str) -> AppResult<Option<Toy>>;
    async fn select_toy_by_owner(&self, toy_id: &str, owner: &str) -> AppResult<Option<Toy>>;
    async fn update_toy(
        &self,
        toy_id: &str,
        owner: &str,
        changes: &ToyChanges,
    ) -> AppResult<Option<Toy>>;
    /// Conditional status update guarded by `status != removed`
    async fn update_toy_status(
        &self,
        toy_id: &str,
        owner: &str,
        status: ToyStatus,
    ) -> AppResult<Option<Toy>>;
    async fn list_toys(
        &self,
        query: &ToyQuery,
        after: Option<&str>,
        limit: i64,
    ) -> AppResult<Vec<Toy>>;

    // Exchanges

    /// Insert an exchange and both participant rows in one transaction.
    /// A replayed token returns the stored exchange and writes nothing.
    /// Ownership and the active-exchange guard are checked against the
    /// locked toy rows, so concurrent proposals for one toy serialise.
    async fn create_exchange(
        &self,
        exchange: Exchange,
        details: [ExchangeDetails; 2],
    ) -> AppResult<Exchange>;
    async fn select_exchange_by_token(&self, token: &str) -> AppResult<Option<Exchange>>;
    /// Joined participant rows for the given exchanges, ordered by exchange id
    async fn select_exchange_rows(&self, exchange_ids: &[String])
        -> AppResult<Vec<ExchangeParticipant>>;
    /// Run `planner` over the locked participant rows and persist its plan
    async fn transition_participant(
        &self,
        exchange_id: &str,
        planner: &TransitionPlanner,
    ) -> AppResult<(ParticipantTransition, Vec<ExchangeParticipant>)>;
    /// Ids of exchanges `user_id` takes part in, ascending
    async fn list_exchange_ids(
        &self,
        user_id: &str,
        statuses: Option<&[ExchangeStatus]>,
        after: Option<&str>,
        limit: i64,
    ) -> AppResult<Vec<String>>;

    // Users

    /// Insert a user; a taken e-mail is a `Conflict`
    async fn insert_user(&self, user: User) -> AppResult<User>;
    async fn select_user(&self, user_id: &str) -> AppResult<Option<User>>;
    async fn select_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
}

/// Create a connection pool, with TLS when the config asks for it
pub async fn create_pool(config: &DatabaseConfig) -> AppResult<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.dbname = Some(config.database.clone());
    cfg.pool = Some(deadpool_postgres::PoolConfig::new(config.max_pool_size));
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    let pool = if config.require_tls {
        let certs = rustls_native_certs::load_native_certs();
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
        cfg.create_pool(Some(Runtime::Tokio1), tls)
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
    }
    .map_err(|e| AppError::Config(format!("Failed to create pool: {}", e)))?;

    // Test connection
    let client = pool.get().await?;
    client.query_one("SELECT 1", &[]).await?;
    drop(client);

    info!(
        host = %config.host,
        database = %config.database,
        tls = config.require_tls,
        "Database connection pool established"
    );
    Ok(pool)
}

/// Create tables and indexes if they don't exist
pub async fn bootstrap_schema(pool: &Pool) -> AppResult<()> {
    let client = pool.get().await?;
    for statement in queries::SCHEMA {
        client.execute(*statement, &[]).await?;
    }
    info!("Database tables initialized");
    Ok(())
}
