use crate::*;

use std::sync::Arc;
use std::time::Duration;

use cadence_core::amount::dyo;
use cadence_core::config::CadenceConfig;
use cadence_core::rates::RateConfig;
use cadence_core::types::PoolState;
use cadence_services::{
    spawn_persistence_task, DurableStore, EmissionOutcome, JsonFileStore, RewardEngine,
};
use rust_decimal::Decimal;
use tokio::sync::mpsc;

/// Epoch rollover replaces the pool, activates the staged rate config, and
/// keeps sequence numbering monotonic across the boundary.
#[test]
fn epoch_rollover_swaps_pool_and_rates() {
    let (engine, _rx) = engine_with_capacity(1_000_000);

    engine.handle_session(&listener_session("alice", 90, at(0, 10)), at(0, 10));
    assert_eq!(engine.pool_state().last_sequence, 1);

    let mut proposal = RateConfig::default();
    proposal.version = 2;
    proposal.listener_rate = Decimal::new(2, 1); // 0.2
    proposal.artist_rate = Decimal::ONE;
    engine.apply_rate_config(proposal).unwrap();
    assert_eq!(engine.current_rates().active.version, 1);

    engine.set_next_epoch_capacity(dyo(1_200_000));
    engine.maintain(at(30, 0));

    let snap = engine.pool_state();
    assert_eq!(snap.pool.capacity, dyo(1_200_000));
    assert_eq!(snap.pool.remaining, dyo(1_200_000));
    assert_eq!(snap.pool.epoch_start, epoch_start() + chrono::Days::new(30));
    assert_eq!(snap.emitted_this_epoch, Decimal::ZERO);
    assert_eq!(snap.record_count, 0);
    assert_eq!(engine.current_rates().active.version, 2);

    // Sequence continues rather than restarting
    let outcome = engine.handle_session(&listener_session("bob", 60, at(30, 10)), at(30, 10));
    match outcome.emission {
        EmissionOutcome::Emitted {
            sequence,
            listener_share,
            ..
        } => {
            assert_eq!(sequence, 2);
            assert_eq!(listener_share, dyo(12)); // 60 × 0.2
        }
        other => panic!("expected emission, got {other:?}"),
    }
}

/// An exhausted pool stays soft-capped until rollover reopens emission.
#[test]
fn rollover_clears_soft_cap() {
    let (engine, _rx) = engine_with_capacity(100);

    engine.handle_session(&listener_session("alice", 90, at(0, 10)), at(0, 10));
    assert!(engine.pool_state().soft_capped);

    engine.maintain(at(30, 0));
    assert!(!engine.pool_state().soft_capped);

    let outcome = engine.handle_session(&listener_session("bob", 30, at(30, 10)), at(30, 10));
    assert!(matches!(outcome.emission, EmissionOutcome::Emitted { .. }));
}

/// Maintenance that runs long after several missed boundaries lands on the
/// aligned epoch grid, not on the wall-clock day it happened to run.
#[test]
fn late_maintenance_snaps_to_epoch_grid() {
    let (engine, _rx) = engine_with_capacity(1_000_000);
    engine.maintain(at(73, 5));
    assert_eq!(
        engine.pool_state().pool.epoch_start,
        epoch_start() + chrono::Days::new(60)
    );
}

/// Full restart cycle: emissions drain to the durable store, the snapshot
/// captures pool and quota counters, and a recovered engine resumes with
/// the same balances and the next sequence number.
#[tokio::test]
async fn restart_recovers_pool_quota_and_sequence() {
    let dir = std::env::temp_dir().join(format!(
        "cadence-restart-{}-{}",
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)
    ));
    let config = CadenceConfig::default();

    // First life
    {
        let store: Arc<dyn DurableStore> = Arc::new(JsonFileStore::open(&dir).unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        let pool = PoolState::new(dyo(1_000_000), epoch_start(), 30);
        let engine = RewardEngine::new(&config, pool, tx);
        let task = spawn_persistence_task(store.clone(), rx);

        engine.handle_session(&listener_session("alice", 90, at(0, 10)), at(0, 10));
        engine.handle_session(&listener_session("bob", 40, at(0, 11)), at(0, 11));

        // Wait for the pipeline to drain
        for _ in 0..100 {
            if store.last_sequence().unwrap() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.last_sequence().unwrap(), 2);

        store.save_pool_state(&engine.pool_state().pool).unwrap();
        store.save_accounts(&engine.export_accounts()).unwrap();
        task.abort();
    }

    // Second life
    {
        let store: Arc<dyn DurableStore> = Arc::new(JsonFileStore::open(&dir).unwrap());
        let pool = store.load_pool_state().unwrap().expect("pool snapshot");
        let accounts = store.load_accounts().unwrap();
        let last_sequence = store.last_sequence().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let engine = RewardEngine::recover(&config, pool, last_sequence, accounts, tx);

        // 90 × 1.8 + 40 × 1.8 = 234 already emitted
        assert_eq!(engine.pool_state().pool.remaining, dyo(1_000_000) - dyo(234));

        // Alice's cap is still consumed
        let outcome = engine.handle_session(&listener_session("alice", 30, at(0, 14)), at(0, 14));
        assert_eq!(outcome.granted_minutes, 0);

        // Bob continues where he left off, with the next sequence
        let outcome = engine.handle_session(&listener_session("bob", 30, at(0, 14)), at(0, 14));
        assert_eq!(outcome.granted_minutes, 30);
        match outcome.emission {
            EmissionOutcome::Emitted { sequence, .. } => assert_eq!(sequence, 3),
            other => panic!("expected emission, got {other:?}"),
        }
    }

    let _ = std::fs::remove_dir_all(&dir);
}
