use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::api::middleware::RateLimitState;
use crate::config::{RateLimitBackend, ServerConfig};
use crate::rate_limit::{MemoryStore, PostgresStore, RateLimitPolicy, RateLimitStore, RateLimiter};

pub mod api;
pub mod config;
pub mod db;
pub mod rate_limit;
pub mod repository;
pub mod service;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keel_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Keel Orchestrator...");

    let config = ServerConfig::from_env().context("Invalid orchestrator configuration")?;

    tracing::info!("Connecting to database...");

    // Create database connection pool
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    // Run migrations
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let rate_limit = if config.rate_limit.enabled {
        let store: Arc<dyn RateLimitStore> = match config.rate_limit.backend {
            RateLimitBackend::Memory => Arc::new(MemoryStore::default()),
            RateLimitBackend::Postgres => Arc::new(PostgresStore::new(pool.clone())),
        };
        tracing::info!(
            "Rate limiting enabled: {:?} store, {} requests per {:?} by default",
            config.rate_limit.backend,
            config.rate_limit.default_limit,
            config.rate_limit.window
        );
        Some(RateLimitState::new(
            RateLimiter::new(store),
            RateLimitPolicy::from_config(&config.rate_limit),
        ))
    } else {
        tracing::warn!("Rate limiting disabled");
        None
    };

    tracing::info!("Cascade policy: {:?}", config.cascade);

    // Build router with all API endpoints
    let state = AppState {
        pool,
        cascade: config.cascade,
    };
    let app = api::create_router(state, rate_limit);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server terminated")?;

    Ok(())
}
