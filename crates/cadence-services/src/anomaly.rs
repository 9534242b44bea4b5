//! Anomaly detection — rule-based classification of farming and Sybil
//! patterns.
//!
//! Every rule is a pure function over read-only snapshots. Detection is an
//! observation channel: flags are advisory, never errors, and nothing here
//! touches the ledger's write lock or gates emission. Enforcement, if it
//! ever comes, plugs in downstream of the flag board.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cadence_core::config::AnomalyConfig;
use cadence_core::types::{AccountId, Fingerprint, PoolState};

use crate::quota::AccountUsage;

/// What a flag points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "lowercase")]
pub enum FlagScope {
    Account(AccountId),
    /// One fingerprint's account cluster.
    Cluster(Fingerprint),
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlagKind {
    LimitSaturation,
    ContinuousSession,
    IpCluster,
    EmissionVelocity,
    PoolDepletionPace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Notice,
    Warning,
    Critical,
}

/// Evidence captured when the rule fired, for the operator reviewing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FlagEvidence {
    Saturation {
        streak_days: u32,
        cap_minutes: u32,
    },
    Continuous {
        session_minutes: u32,
        gap_minutes: i64,
    },
    IpCluster {
        fingerprint: Fingerprint,
        saturating_accounts: Vec<AccountId>,
    },
    Velocity {
        observed_per_day: Decimal,
        projected_per_day: Decimal,
    },
    DepletionPace {
        fraction_remaining: Decimal,
        expected_fraction: Decimal,
        day_index: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFlag {
    pub scope: FlagScope,
    pub kind: FlagKind,
    pub severity: Severity,
    pub evidence: FlagEvidence,
    pub raised_at: DateTime<Utc>,
}

// ── Per-account rules ─────────────────────────────────────────────────────────

/// LimitSaturation and ContinuousSession for one account's snapshot.
pub fn check_account(
    account_id: &AccountId,
    usage: &AccountUsage,
    cap: u32,
    config: &AnomalyConfig,
    now: DateTime<Utc>,
) -> Vec<AnomalyFlag> {
    let mut flags = Vec::new();
    let today = now.date_naive();

    let streak = usage.effective_streak(cap, today);
    if streak >= config.saturation_streak_days && config.saturation_streak_days > 0 {
        // Severity escalates with the streak: one day is worth noting, a
        // week of wall-to-wall saturation is a farm signature
        let severity = if streak >= 7 {
            Severity::Critical
        } else if streak >= 3 {
            Severity::Warning
        } else {
            Severity::Notice
        };
        flags.push(AnomalyFlag {
            scope: FlagScope::Account(account_id.clone()),
            kind: FlagKind::LimitSaturation,
            severity,
            evidence: FlagEvidence::Saturation {
                streak_days: streak,
                cap_minutes: cap,
            },
            raised_at: now,
        });
    }

    if let Some(flag) = check_continuous(account_id, usage, config, now) {
        flags.push(flag);
    }

    flags
}

/// A single session at or past the continuous threshold with no gap since
/// the previous one.
fn check_continuous(
    account_id: &AccountId,
    usage: &AccountUsage,
    config: &AnomalyConfig,
    now: DateTime<Utc>,
) -> Option<AnomalyFlag> {
    let last = usage.history.back()?;
    if last.committed_minutes < config.continuous_session_minutes {
        return None;
    }
    let prev = usage.history.iter().rev().nth(1)?;
    let gap_minutes = (last.start - prev.end).num_minutes();
    if gap_minutes > config.max_session_gap_minutes {
        return None;
    }
    let severity = if last.committed_minutes >= config.continuous_session_minutes * 2 {
        Severity::Critical
    } else {
        Severity::Warning
    };
    Some(AnomalyFlag {
        scope: FlagScope::Account(account_id.clone()),
        kind: FlagKind::ContinuousSession,
        severity,
        evidence: FlagEvidence::Continuous {
            session_minutes: last.committed_minutes,
            gap_minutes,
        },
        raised_at: now,
    })
}

// ── Cluster rule ──────────────────────────────────────────────────────────────

/// IpCluster: K or more accounts on one fingerprint, each independently
/// saturating its own cap today.
pub fn check_cluster(
    fingerprint: Fingerprint,
    members: &[(AccountId, AccountUsage, u32)],
    config: &AnomalyConfig,
    now: DateTime<Utc>,
) -> Option<AnomalyFlag> {
    let today = now.date_naive();
    let saturating: Vec<AccountId> = members
        .iter()
        .filter(|(_, usage, cap)| usage.day_epoch == today && usage.saturated(*cap))
        .map(|(id, _, _)| id.clone())
        .collect();
    if saturating.len() < config.ip_cluster_accounts {
        return None;
    }
    Some(AnomalyFlag {
        scope: FlagScope::Cluster(fingerprint),
        kind: FlagKind::IpCluster,
        severity: Severity::Critical,
        evidence: FlagEvidence::IpCluster {
            fingerprint,
            saturating_accounts: saturating,
        },
        raised_at: now,
    })
}

// ── System-wide rules ─────────────────────────────────────────────────────────

/// EmissionVelocity: realized trailing debit rate exceeds the projected
/// daily rate by the configured multiplier.
pub fn check_velocity(
    observed_per_day: Decimal,
    projected_per_day: Decimal,
    config: &AnomalyConfig,
    now: DateTime<Utc>,
) -> Option<AnomalyFlag> {
    if projected_per_day <= Decimal::ZERO {
        return None;
    }
    let threshold = projected_per_day * config.velocity_multiplier;
    if observed_per_day <= threshold {
        return None;
    }
    let severity = if observed_per_day > threshold * Decimal::TWO {
        Severity::Critical
    } else {
        Severity::Warning
    };
    Some(AnomalyFlag {
        scope: FlagScope::System,
        kind: FlagKind::EmissionVelocity,
        severity,
        evidence: FlagEvidence::Velocity {
            observed_per_day,
            projected_per_day,
        },
        raised_at: now,
    })
}

/// PoolDepletionPace: remaining fraction falls below the linear-depletion
/// expectation minus the slack margin.
pub fn check_depletion(
    pool: &PoolState,
    config: &AnomalyConfig,
    now: DateTime<Utc>,
) -> Option<AnomalyFlag> {
    if pool.epoch_days == 0 {
        return None;
    }
    let expected = Decimal::ONE
        - Decimal::from(pool.day_index) / Decimal::from(pool.epoch_days);
    let actual = pool.fraction_remaining();
    if actual >= expected - config.depletion_slack {
        return None;
    }
    let severity = if actual < Decimal::new(1, 1) {
        Severity::Critical
    } else {
        Severity::Warning
    };
    Some(AnomalyFlag {
        scope: FlagScope::System,
        kind: FlagKind::PoolDepletionPace,
        severity,
        evidence: FlagEvidence::DepletionPace {
            fraction_remaining: actual,
            expected_fraction: expected,
            day_index: pool.day_index,
        },
        raised_at: now,
    })
}

// ── Flag board ────────────────────────────────────────────────────────────────

/// Active flags, keyed by (scope, kind). A sweep replaces the whole board so
/// flags whose rule no longer fires expire naturally.
#[derive(Clone, Default)]
pub struct FlagBoard {
    flags: Arc<DashMap<(FlagScope, FlagKind), AnomalyFlag>>,
}

impl FlagBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise or refresh a single flag.
    pub fn raise(&self, flag: AnomalyFlag) {
        self.flags
            .insert((flag.scope.clone(), flag.kind), flag);
    }

    /// Swap in the result of a full sweep.
    pub fn replace_all(&self, flags: Vec<AnomalyFlag>) {
        self.flags.clear();
        for flag in flags {
            self.raise(flag);
        }
    }

    /// All active flags, most severe first.
    pub fn active(&self) -> Vec<AnomalyFlag> {
        let mut flags: Vec<AnomalyFlag> = self.flags.iter().map(|e| e.value().clone()).collect();
        flags.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.kind_order().cmp(&b.kind_order())));
        flags
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl AnomalyFlag {
    fn kind_order(&self) -> u8 {
        match self.kind {
            FlagKind::PoolDepletionPace => 0,
            FlagKind::EmissionVelocity => 1,
            FlagKind::IpCluster => 2,
            FlagKind::LimitSaturation => 3,
            FlagKind::ContinuousSession => 4,
        }
    }
}
