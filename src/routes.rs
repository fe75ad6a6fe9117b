//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod auth;
mod exchanges;
mod extract;
mod toys;

use crate::auth::{require_user, USER_ID_HEADER};
use crate::config::CorsConfig;
use crate::state::SharedState;
use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use self::extract::IDEMPOTENCY_HEADER;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::{warn, Level};

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, cors: &CorsConfig) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(cors);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    // Routes that need a known caller
    let protected = Router::new()
        .route("/toys", post(toys::create_toy).put(toys::update_toy))
        .route("/toys/list", post(toys::list_toys))
        .route(
            "/toys/{id}",
            get(toys::get_toy)
                .patch(toys::patch_toy)
                .delete(toys::delete_toy),
        )
        .route("/my/toys/{id}", get(toys::get_own_toy))
        .route("/exchanges", post(exchanges::propose_exchange))
        .route("/exchanges/list", post(exchanges::list_exchanges))
        .route(
            "/exchanges/{id}",
            get(exchanges::get_exchange).patch(exchanges::patch_exchange),
        )
        .route_layer(from_fn_with_state(state.clone(), require_user));

    let v1 = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .merge(protected);

    // Build the router
    Router::new()
        // Health check
        .route("/health", get(health_check))
        .nest("/v1", v1)
        // Apply middleware and state
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(IDEMPOTENCY_HEADER),
        ])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}

/// Health check endpoint
async fn health_check(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let storage = match state.storage.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            warn!("Health check storage ping failed: {}", e);
            "unavailable"
        }
    };

    Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "storage": storage,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
