//! cardlimits - card management backend API
//!
//! Issues cards and enforces daily, weekly and monthly spending limits per
//! transaction type.

use std::net::SocketAddr;

use sqlx::postgres::PgPoolOptions;

use cardlimits::api::middleware::ApiKeyRegistry;
use cardlimits::jobs::{JobScheduler, JobSchedulerConfig};
use cardlimits::{build_router, db, init_tracing, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let api_keys = ApiKeyRegistry::from_config(&config.api_keys);
    if api_keys.is_empty() {
        tracing::warn!("No API keys configured; every API request will be rejected");
    }

    tracing::info!(environment = %config.environment, "Starting cardlimits server");

    let pool = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await?;

            if !db::check_schema(&pool).await? {
                tracing::error!("Database schema is not complete. Please run migrations.");
                return Err(anyhow::anyhow!("Database schema incomplete"));
            }
            tracing::info!("Database connected successfully");
            Some(pool)
        }
        None if config.is_production() => {
            return Err(anyhow::anyhow!(
                "DATABASE_URL is required in production; refusing to use the in-memory store"
            ));
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store, data is lost on exit");
            None
        }
    };

    let state = match &pool {
        Some(pool) => AppState::postgres(pool.clone(), api_keys, config.max_cards_per_user),
        None => AppState::in_memory(api_keys, config.max_cards_per_user),
    };

    let scheduler = config.limit_sweep_interval.map(|interval| {
        JobScheduler::with_config(
            state.cards.clone(),
            JobSchedulerConfig {
                limit_sweep_interval: interval,
            },
        )
        .start()
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutting down...");
    if let Some(handle) = scheduler {
        handle.abort();
    }
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed");
    }
    tracing::info!("Goodbye!");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
