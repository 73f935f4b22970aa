//! cardlimits Library
//!
//! Card management backend with period-based spending limits. The binary in
//! `main.rs` wires these modules together; integration tests drive the same
//! router through [`build_router`].

pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod domain;
mod error;
pub mod handlers;
pub mod jobs;
pub mod repository;
pub mod state;

use axum::{middleware, Router};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use config::{Config, LogFormat};
pub use domain::{Amount, AmountError, Card, CardLimit, DomainError, LimitPeriod, OperationContext, TransactionType};
pub use error::{AppError, AppResult};
pub use state::AppState;

/// Initialize tracing/logging
pub fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cardlimits=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Layers run last-added first: logging -> auth -> handler
    let protected_routes = api::create_router()
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(api::middleware::logging_middleware));

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
