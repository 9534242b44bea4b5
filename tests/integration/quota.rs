use crate::*;

use cadence_core::types::{AccountId, Role};
use cadence_services::{EmissionOutcome, SkipReason};

/// Listener cap 90 min/day: requests past it truncate, then grant zero.
#[test]
fn listener_cap_truncates_then_blocks() {
    let (engine, _rx) = engine_with_capacity(1_000_000);

    let outcome = engine.handle_session(&listener_session("alice", 60, at(0, 8)), at(0, 8));
    assert_eq!(outcome.granted_minutes, 60);

    // 60 used, 30 left: a 45-minute session grants 30
    let outcome = engine.handle_session(&listener_session("alice", 45, at(0, 12)), at(0, 12));
    assert_eq!(outcome.granted_minutes, 30);

    let outcome = engine.handle_session(&listener_session("alice", 10, at(0, 18)), at(0, 18));
    assert_eq!(outcome.granted_minutes, 0);
    assert_eq!(
        outcome.emission,
        EmissionOutcome::Skipped {
            reason: SkipReason::CapReached
        }
    );

    let quota = engine.account_quota(&AccountId::new("alice"), at(0, 19)).unwrap();
    assert_eq!(quota.used_minutes_today, 90);
    assert_eq!(quota.remaining_minutes, 0);
}

/// Artists carry their own 120-minute cap, independent of listeners.
#[test]
fn artist_cap_is_independent() {
    let (engine, _rx) = engine_with_capacity(1_000_000);
    let now = at(0, 8);

    let outcome = engine.handle_session(&session("band", Role::Artist, 150, now), now);
    assert_eq!(outcome.granted_minutes, 120);

    let quota = engine.account_quota(&AccountId::new("band"), now).unwrap();
    assert_eq!(quota.cap_minutes, 120);
    assert_eq!(quota.remaining_minutes, 0);
}

/// The cap holds exactly under concurrent sessions for one account.
#[test]
fn concurrent_sessions_cannot_exceed_cap() {
    let (engine, _rx) = engine_with_capacity(1_000_000);
    let now = at(0, 10);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                let mut granted = 0u32;
                for _ in 0..10 {
                    granted += engine
                        .handle_session(&listener_session("shared", 30, now), now)
                        .granted_minutes;
                }
                granted
            })
        })
        .collect();

    let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 90);

    let quota = engine.account_quota(&AccountId::new("shared"), now).unwrap();
    assert_eq!(quota.used_minutes_today, 90);
}

/// Crossing a day boundary resets the counter exactly once, and the new
/// day starts from zero no matter how many sessions race across it.
#[test]
fn day_boundary_resets_quota_once() {
    let (engine, _rx) = engine_with_capacity(1_000_000);

    engine.handle_session(&listener_session("alice", 90, at(0, 10)), at(0, 10));
    assert_eq!(
        engine
            .account_quota(&AccountId::new("alice"), at(0, 23))
            .unwrap()
            .remaining_minutes,
        0
    );

    // Next day: racing sessions all see a fresh counter, summing to one cap
    let tomorrow = at(1, 0);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                engine
                    .handle_session(&listener_session("alice", 45, tomorrow), tomorrow)
                    .granted_minutes
            })
        })
        .collect();
    let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 90);

    let quota = engine.account_quota(&AccountId::new("alice"), tomorrow).unwrap();
    assert_eq!(quota.used_minutes_today, 90);
    assert_eq!(quota.day_epoch, epoch_start() + chrono::Days::new(1));
}

/// Unknown accounts have no quota standing.
#[test]
fn unknown_account_quota_is_none() {
    let (engine, _rx) = engine_with_capacity(1_000_000);
    assert!(engine.account_quota(&AccountId::new("nobody"), at(0, 0)).is_none());
}
