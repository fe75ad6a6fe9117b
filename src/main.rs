//! ToySwap API - toy exchange marketplace backend
//!
//! Users list the toys they own and negotiate two-party swaps. Each side of
//! an exchange confirms twice (or fails it); while both sides are confirming,
//! each change e-mails both users the other's contact details.

mod auth;
mod config;
mod db;
mod error;
mod exchange;
mod models;
mod notify;
mod pagination;
mod routes;
mod state;
mod toys;
mod users;

use crate::config::{NotificationConfig, Settings, StorageBackend};
use crate::db::{MemoryStorage, PgStorage, Storage};
use crate::notify::{LogNotifier, NotificationQueue, Notifier, RetryPolicy, SmtpNotifier};
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("Starting ToySwap API...");
    info!("Configuration loaded successfully");

    let storage = init_storage(&settings).await?;
    let notifications = init_notifications(&settings.notifications)?;
    let state = Arc::new(AppState::new(storage, notifications));

    // Build the router
    let app = create_router(state, &settings.cors);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("Server listening on http://{}", addr);
    info!("API Endpoints:");
    info!("   POST   /v1/register            - Register new account");
    info!("   POST   /v1/login               - Login with email/password");
    info!("   POST   /v1/toys                - Create toy (x-idempotency-token)");
    info!("   PUT    /v1/toys                - Update toy");
    info!("   PATCH  /v1/toys/{{id}}           - Change toy status");
    info!("   DELETE /v1/toys/{{id}}           - Remove toy");
    info!("   GET    /v1/toys/{{id}}           - Get toy");
    info!("   GET    /v1/my/toys/{{id}}        - Get own toy");
    info!("   POST   /v1/toys/list           - List toys");
    info!("   POST   /v1/exchanges           - Propose exchange (x-idempotency-token)");
    info!("   GET    /v1/exchanges/{{id}}      - Get exchange");
    info!("   PATCH  /v1/exchanges/{{id}}      - Confirm or fail your side");
    info!("   POST   /v1/exchanges/list      - List your exchanges");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging (`LOG_FORMAT=json` for JSON lines)
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,toyswap_api=debug,tower_http=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init();
    }
}

/// Pick the storage backend and prepare it
async fn init_storage(settings: &Settings) -> anyhow::Result<Arc<dyn Storage>> {
    match settings.database.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage, data is lost on restart");
            Ok(Arc::new(MemoryStorage::new()))
        }
        StorageBackend::Postgres => {
            let pool = db::create_pool(&settings.database).await?;

            // Create tables if they don't exist
            db::bootstrap_schema(&pool).await?;

            Ok(Arc::new(PgStorage::new(pool, settings.database.timeout)))
        }
    }
}

/// Start the notification worker with an SMTP or log-only sender
fn init_notifications(config: &NotificationConfig) -> anyhow::Result<NotificationQueue> {
    let notifier: Arc<dyn Notifier> = match &config.smtp {
        Some(smtp) => {
            info!(host = %smtp.host, port = smtp.port, "Sending notifications over SMTP");
            Arc::new(SmtpNotifier::new(smtp)?)
        }
        None => {
            warn!("SMTP_HOST not set, notifications are only logged");
            Arc::new(LogNotifier)
        }
    };

    Ok(NotificationQueue::start(
        notifier,
        RetryPolicy::from_config(config),
        config.queue_capacity,
    ))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
