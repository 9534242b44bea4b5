//! Cadence integration test harness.
//!
//! Tests here run the full engine in-process: real quota tracker, pool
//! ledger, anomaly sweep, and persistence pipeline, driven with explicit
//! clocks so day and epoch boundaries are deterministic. No network, no
//! shared state between tests.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tokio::sync::mpsc;

use cadence_core::amount::dyo;
use cadence_core::config::CadenceConfig;
use cadence_core::types::{AccountId, EmissionRecord, Fingerprint, PoolState, Role, Session};
use cadence_services::RewardEngine;

mod conservation;
mod quota;
mod rollover;
mod scenarios;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const EPOCH_START: (i32, u32, u32) = (2025, 6, 1);

pub fn epoch_start() -> NaiveDate {
    let (y, m, d) = EPOCH_START;
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Instant `days` after epoch start, at the given hour.
pub fn at(days: i64, hour: u32) -> DateTime<Utc> {
    let (y, m, d) = EPOCH_START;
    Utc.with_ymd_and_hms(y, m, d, hour, 0, 0).unwrap() + chrono::Duration::days(days)
}

/// Engine over a fresh pool with the launch config, plus the receiving end
/// of its persistence channel.
pub fn engine_with_capacity(
    capacity: i64,
) -> (Arc<RewardEngine>, mpsc::UnboundedReceiver<EmissionRecord>) {
    let config = CadenceConfig::default();
    let pool = PoolState::new(dyo(capacity), epoch_start(), config.pool.epoch_days);
    let (tx, rx) = mpsc::unbounded_channel();
    (RewardEngine::new(&config, pool, tx), rx)
}

pub fn session(account: &str, role: Role, minutes: u32, start: DateTime<Utc>) -> Session {
    Session {
        account_id: AccountId::new(account),
        role,
        content_id: "track-1".into(),
        artist_id: AccountId::new("artist-1"),
        start,
        end: start + chrono::Duration::minutes(i64::from(minutes)),
        requested_minutes: minutes,
        fingerprint: None,
    }
}

pub fn listener_session(account: &str, minutes: u32, start: DateTime<Utc>) -> Session {
    session(account, Role::Listener, minutes, start)
}

pub fn fingerprinted_session(
    account: &str,
    minutes: u32,
    start: DateTime<Utc>,
    fingerprint: Fingerprint,
) -> Session {
    let mut s = listener_session(account, minutes, start);
    s.fingerprint = Some(fingerprint);
    s
}

/// Drain every record currently queued on the persistence channel.
pub fn drain_records(rx: &mut mpsc::UnboundedReceiver<EmissionRecord>) -> Vec<EmissionRecord> {
    let mut records = Vec::new();
    while let Ok(record) = rx.try_recv() {
        records.push(record);
    }
    records
}
