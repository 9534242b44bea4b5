//! Monitor cadence — day/epoch maintenance, anomaly sweeps, and
//! sustainability alerting on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use cadence_services::{RewardEngine, SustainabilityBand};

pub async fn run(engine: Arc<RewardEngine>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let mut last_band: Option<SustainabilityBand> = None;

    loop {
        ticker.tick().await;
        let now = Utc::now();

        engine.maintain(now);
        engine.run_anomaly_sweep(now);

        let projection = engine.projection();
        if last_band.is_some() && last_band != Some(projection.band) {
            tracing::warn!(
                from = ?last_band,
                to = ?projection.band,
                days_remaining = ?projection.days_remaining,
                "sustainability band changed"
            );
        }
        last_band = Some(projection.band);

        let flags = engine.active_flags();
        if !flags.is_empty() {
            tracing::info!(active_flags = flags.len(), "monitor sweep complete");
        }
    }
}
