mod api;
mod config;
mod dataset;
mod db;
mod error;
mod model;
mod pipeline;
mod retry;
mod scorer;
mod types;

#[cfg(test)]
mod testutil;

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::{PersistenceWriter, SqliteStore};
use crate::error::Result;
use crate::model::ModelRegistry;
use crate::retry::RetryPolicy;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Models: all or nothing ---
    let registry = Arc::new(ModelRegistry::load(&cfg.models_dir)?);

    // --- Database setup ---
    let pool = SqlitePoolOptions::new()
        .connect(&format!("sqlite:{}?mode=rwc", cfg.db_path))
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);
    info!(
        models = registry.len(),
        "Model registry ready: {}",
        registry.describe()
    );

    let retry = RetryPolicy::fixed(cfg.upsert_max_attempts, cfg.upsert_retry_delay);
    let writer = PersistenceWriter::new(Arc::new(SqliteStore::new(pool.clone())), retry);
    info!(
        chunk_size = cfg.chunk_size,
        attempts = retry.max_attempts,
        delay_ms = retry.delay.as_millis() as u64,
        "Scoring pipeline configured"
    );

    // --- HTTP API server ---
    let api_state = ApiState {
        pool,
        registry,
        writer: Arc::new(writer),
        chunk_size: cfg.chunk_size,
        health: Arc::new(HealthState::new()),
        latency: Arc::new(LatencyStats::new()),
    };
    let app = router(api_state, cfg.max_upload_bytes);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
