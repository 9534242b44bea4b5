//! cadenced — Cadence reward-emission daemon.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use cadence_core::config::CadenceConfig;
use cadence_core::types::{EmissionRecord, PoolState};
use cadence_services::{
    spawn_persistence_task, DurableStore, JsonFileStore, RateController, RewardEngine,
};

mod monitor;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = CadenceConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = CadenceConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        CadenceConfig::default()
    });
    tracing::info!(
        capacity = config.pool.monthly_capacity,
        epoch_days = config.pool.epoch_days,
        api_port = config.api.port,
        "cadenced starting"
    );

    // Durable store + recovery
    let store: Arc<dyn DurableStore> = Arc::new(
        JsonFileStore::open(&config.store.data_path)
            .with_context(|| format!("failed to open store at {}", config.store.data_path.display()))?,
    );
    tracing::info!(path = %config.store.data_path.display(), "durable store opened");

    let pool = match store.load_pool_state() {
        Ok(Some(pool)) => {
            tracing::info!(
                remaining = %pool.remaining,
                epoch_start = %pool.epoch_start,
                "pool recovered from store"
            );
            pool
        }
        Ok(None) => {
            let pool = PoolState::new(
                Decimal::from(config.pool.monthly_capacity),
                Utc::now().date_naive(),
                config.pool.epoch_days,
            );
            tracing::info!(capacity = %pool.capacity, "fresh pool epoch started");
            pool
        }
        Err(e) => anyhow::bail!("failed to load pool state: {e}"),
    };

    let accounts = store.load_accounts().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load accounts, starting empty");
        Vec::new()
    });
    let last_sequence = store
        .last_sequence()
        .context("failed to scan emission log")?;
    tracing::info!(accounts = accounts.len(), last_sequence, "state recovered");

    // Engine + persistence pipeline
    let (persist_tx, persist_rx) = mpsc::unbounded_channel::<EmissionRecord>();
    let engine = RewardEngine::recover(&config, pool, last_sequence, accounts, persist_tx);
    let persistence_task = spawn_persistence_task(store.clone(), persist_rx);

    // Bring the pool day current before serving anything
    engine.maintain(Utc::now());

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let monitor_task = tokio::spawn(monitor::run(
        engine.clone(),
        std::time::Duration::from_secs(config.monitor.sweep_interval_secs),
    ));

    let api_task = {
        let state = cadence_api::ApiState {
            engine: engine.clone(),
            controller: RateController::default(),
        };
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = cadence_api::serve(state, port).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown signal received"),
        r = monitor_task            => tracing::error!("monitor task exited: {:?}", r),
        r = api_task                => tracing::error!("API task exited: {:?}", r),
        r = persistence_task        => tracing::error!("persistence task exited: {:?}", r),
    }

    // Final snapshot. Emission records are already durable via the
    // persistence pipeline; this captures the pool and quota counters.
    if let Err(e) = store.save_pool_state(&engine.pool_state().pool) {
        tracing::warn!(error = %e, "failed to save pool snapshot on shutdown");
    }
    if let Err(e) = store.save_accounts(&engine.export_accounts()) {
        tracing::warn!(error = %e, "failed to save account snapshot on shutdown");
    }
    tracing::info!("shutdown complete");

    Ok(())
}
