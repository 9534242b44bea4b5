use crate::*;

use cadence_core::amount::dyo;
use cadence_core::rates::RateConfig;
use cadence_services::projection::{scenario, ScenarioInput};
use cadence_services::{EmissionOutcome, RateController, RunwayTarget, SustainabilityBand};
use rust_decimal::Decimal;

/// The launch-economics table: 1,000 listeners at the full 90-minute cap
/// overrun the monthly pool in under a week.
#[test]
fn thousand_capped_listeners_overrun_the_pool() {
    let rates = RateConfig::default();
    let input = ScenarioInput {
        listeners: 1_000,
        avg_minutes_per_day: 90,
    };
    let projection = scenario(&input, &rates, dyo(1_000_000), 30);

    // 1,000 × 90 × 1.8 = 162,000 DYO/day → 6.17 days
    assert_eq!(projection.days_remaining, Some(Decimal::new(617, 2)));
    assert_eq!(projection.band, SustainabilityBand::Insufficient);
}

/// A modest cohort keeps the pool on a sustainable pace.
#[test]
fn small_cohort_projects_excellent() {
    let rates = RateConfig::default();
    let input = ScenarioInput {
        listeners: 100,
        avg_minutes_per_day: 15,
    };
    let projection = scenario(&input, &rates, dyo(1_000_000), 30);
    // 100 × 15 × 1.8 = 2,700/day → 370 days
    assert_eq!(projection.days_remaining, Some(Decimal::new(37037, 2)));
    assert_eq!(projection.band, SustainabilityBand::Excellent);
}

/// Requested minutes past the daily cap do not inflate the projection.
#[test]
fn scenario_clamps_to_the_daily_cap() {
    let rates = RateConfig::default();
    let capped = scenario(
        &ScenarioInput {
            listeners: 500,
            avg_minutes_per_day: 1_440,
        },
        &rates,
        dyo(1_000_000),
        30,
    );
    let at_cap = scenario(
        &ScenarioInput {
            listeners: 500,
            avg_minutes_per_day: 90,
        },
        &rates,
        dyo(1_000_000),
        30,
    );
    assert_eq!(capped, at_cap);
}

/// Live projection tracks realized velocity: an engine emitting at the
/// unsustainable audit pace reports Insufficient from real debits.
#[test]
fn live_velocity_reproduces_the_audit_band() {
    let (engine, _rx) = engine_with_capacity(1_000_000);
    let now = at(0, 10);

    // 700 listeners × 60 min × 1.8 = 75,600 DYO on day one
    for n in 0..700 {
        engine.handle_session(&listener_session(&format!("acct-{n}"), 60, now), now);
    }

    let projection = engine.projection();
    assert_eq!(engine.velocity(), dyo(75_600));
    // (1,000,000 − 75,600) / 75,600 ≈ 12.23 days left
    assert_eq!(projection.days_remaining, Some(Decimal::new(1223, 2)));
    assert_eq!(projection.band, SustainabilityBand::Insufficient);
}

/// Controller-to-engine round trip: propose corrective rates for a one-year
/// runway, stage them, roll the epoch, and emit at the new rates.
#[test]
fn corrective_rates_flow_through_the_engine() {
    let (engine, _rx) = engine_with_capacity(1_000_000);
    let controller = RateController::default();

    let target = RunwayTarget {
        target_runway_days: 30,
        total_listening_minutes_per_day: 42_000,
    };
    let current = engine.current_rates().active;
    let proposed = controller
        .propose_rates(&current, dyo(1_000_000), &target)
        .unwrap();

    // total rate 1,000,000 / (30 × 42,000) ≈ 0.7937, split 1:5
    assert_eq!(proposed.version, 2);
    assert_eq!(proposed.listener_rate, Decimal::new(1323, 4));
    assert_eq!(proposed.artist_rate, Decimal::new(6614, 4));

    engine.apply_rate_config(proposed).unwrap();
    engine.maintain(at(30, 0));

    let outcome = engine.handle_session(&listener_session("alice", 10, at(30, 9)), at(30, 9));
    match outcome.emission {
        EmissionOutcome::Emitted {
            listener_share,
            artist_share,
            ..
        } => {
            assert_eq!(listener_share, Decimal::new(132, 2)); // 10 × 0.1323
            assert_eq!(artist_share, Decimal::new(661, 2)); // 10 × 0.6614
        }
        other => panic!("expected emission, got {other:?}"),
    }
}

/// The capacity lever: hold rates, size the pool for the target runway.
#[test]
fn capacity_proposal_sizes_the_pool() {
    let controller = RateController::default();
    let capacity = controller.propose_capacity(dyo(75_600), 30).unwrap();
    assert_eq!(capacity, dyo(2_268_000));
}
