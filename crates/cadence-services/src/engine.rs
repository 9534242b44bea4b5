//! The reward engine — wires quota, emission, ledger, and observation.
//!
//! `handle_session` is the critical path: grant minutes within the cap,
//! compute shares outside any lock, then take the ledger's single
//! serialization point for the debit. The anomaly sweep and projection run
//! on the daemon's cadence over read-only snapshots and never gate a
//! session.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use cadence_core::config::{AnomalyConfig, CadenceConfig};
use cadence_core::rates::{RateConfig, RateConfigError};
use cadence_core::types::{AccountId, EmissionRecord, PoolState, Session};

use crate::anomaly::{self, AnomalyFlag, FlagBoard};
use crate::emission;
use crate::ledger::{LedgerError, PoolLedger, PoolSnapshot, SessionRef};
use crate::projection::{self, Projection};
use crate::quota::{AccountRecord, QuotaSnapshot, QuotaTracker, SessionSample};

/// Result of feeding one session through the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOutcome {
    /// Minutes actually counted against the daily cap. May be less than
    /// requested (graceful truncation) or zero.
    pub granted_minutes: u32,
    pub emission: EmissionOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EmissionOutcome {
    Emitted {
        sequence: u64,
        listener_share: Decimal,
        artist_share: Decimal,
        balance_after: Decimal,
    },
    /// The session stands; only the reward was skipped.
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The daily cap left no grantable minutes.
    CapReached,
    /// The pool could not cover the shares (soft-cap mode).
    PoolExhausted,
}

/// Active and staged rate configuration. The pending config becomes active
/// only at the next epoch boundary.
struct RateBook {
    active: RateConfig,
    pending: Option<RateConfig>,
}

/// Serializable view of the rate book for the query surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatesView {
    pub active: RateConfig,
    pub pending: Option<RateConfig>,
}

pub struct RewardEngine {
    quota: QuotaTracker,
    ledger: PoolLedger,
    rates: RwLock<RateBook>,
    flags: FlagBoard,
    anomaly: AnomalyConfig,
    /// Capacity used when the next epoch's pool is created.
    next_epoch_capacity: RwLock<Decimal>,
    velocity_window_days: u32,
    persist_tx: mpsc::UnboundedSender<EmissionRecord>,
}

impl RewardEngine {
    /// Fresh engine with an untouched pool.
    pub fn new(
        config: &CadenceConfig,
        pool: PoolState,
        persist_tx: mpsc::UnboundedSender<EmissionRecord>,
    ) -> Arc<Self> {
        Self::recover(config, pool, 0, Vec::new(), persist_tx)
    }

    /// Rebuild from durable state: the persisted pool, the last durably
    /// appended sequence, and the account quota counters.
    pub fn recover(
        config: &CadenceConfig,
        pool: PoolState,
        last_sequence: u64,
        accounts: Vec<AccountRecord>,
        persist_tx: mpsc::UnboundedSender<EmissionRecord>,
    ) -> Arc<Self> {
        let capacity = pool.capacity;
        Arc::new(Self {
            quota: QuotaTracker::restore(accounts),
            ledger: PoolLedger::recover(pool, last_sequence),
            rates: RwLock::new(RateBook {
                active: config.rates.clone(),
                pending: None,
            }),
            flags: FlagBoard::new(),
            anomaly: config.anomaly.clone(),
            next_epoch_capacity: RwLock::new(capacity),
            velocity_window_days: config.monitor.velocity_window_days,
            persist_tx,
        })
    }

    // ── Critical path ─────────────────────────────────────────────────────

    /// Process one completed session: grant, compute, debit, persist.
    pub fn handle_session(&self, session: &Session, now: DateTime<Utc>) -> SessionOutcome {
        let rates = self.active_rates();
        let cap = rates.daily_limit(session.role);

        let granted = self.quota.check_and_reserve(
            &session.account_id,
            session.role,
            session.requested_minutes,
            cap,
            now,
        );
        // The session already happened; commit whatever the cap allows.
        // Commit clamps again under the entry lock, so racing sessions for
        // one account settle here, not at the grant.
        let committed = self.quota.commit_usage(
            &session.account_id,
            session.role,
            granted,
            cap,
            SessionSample {
                content_id: session.content_id.clone(),
                start: session.start,
                end: session.end,
                committed_minutes: granted,
            },
            now,
        );
        if let Some(fingerprint) = session.fingerprint {
            self.quota.record_fingerprint(&session.account_id, fingerprint);
        }

        if committed == 0 {
            tracing::debug!(account = %session.account_id, "daily cap reached, no emission");
            return SessionOutcome {
                granted_minutes: 0,
                emission: EmissionOutcome::Skipped {
                    reason: SkipReason::CapReached,
                },
            };
        }

        // Shares are fixed before the ledger lock; the critical section is
        // check-and-decrement only
        let shares = emission::compute(committed, &rates);
        let session_ref = SessionRef {
            account_id: session.account_id.clone(),
            content_id: session.content_id.clone(),
            artist_id: session.artist_id.clone(),
        };

        match self.ledger.debit(&shares, &session_ref, now) {
            Ok(record) => {
                let outcome = EmissionOutcome::Emitted {
                    sequence: record.sequence,
                    listener_share: record.listener_share,
                    artist_share: record.artist_share,
                    balance_after: record.balance_after,
                };
                tracing::debug!(
                    account = %session.account_id,
                    sequence = record.sequence,
                    minutes = committed,
                    emitted = %record.total(),
                    balance = %record.balance_after,
                    "emission recorded"
                );
                // Best-effort handoff; the ledger stays authoritative even
                // if the persistence task is gone
                if self.persist_tx.send(record).is_err() {
                    tracing::warn!("persistence channel closed, emission record not queued");
                }
                SessionOutcome {
                    granted_minutes: committed,
                    emission: outcome,
                }
            }
            Err(LedgerError::PoolExhausted {
                remaining,
                requested,
            }) => {
                tracing::info!(
                    account = %session.account_id,
                    %remaining,
                    %requested,
                    "pool exhausted, emission skipped"
                );
                SessionOutcome {
                    granted_minutes: committed,
                    emission: EmissionOutcome::Skipped {
                        reason: SkipReason::PoolExhausted,
                    },
                }
            }
        }
    }

    // ── Read surface ──────────────────────────────────────────────────────

    pub fn pool_state(&self) -> PoolSnapshot {
        self.ledger.snapshot()
    }

    pub fn account_quota(&self, account_id: &AccountId, now: DateTime<Utc>) -> Option<QuotaSnapshot> {
        let role = self.quota.get(account_id)?.role;
        let cap = self.active_rates().daily_limit(role);
        self.quota.quota_snapshot(account_id, cap, now)
    }

    pub fn active_flags(&self) -> Vec<AnomalyFlag> {
        self.flags.active()
    }

    pub fn current_rates(&self) -> RatesView {
        let book = self.rates.read().expect("rate book lock poisoned");
        RatesView {
            active: book.active.clone(),
            pending: book.pending.clone(),
        }
    }

    /// Runway projection from the realized trailing velocity.
    pub fn projection(&self) -> Projection {
        let snap = self.ledger.snapshot();
        let velocity = self.ledger.velocity(self.velocity_window_days);
        projection::project(
            snap.pool.remaining,
            velocity,
            snap.pool.epoch_days,
            snap.pool.capacity,
        )
    }

    /// Realized trailing emission velocity, DYO per day.
    pub fn velocity(&self) -> Decimal {
        self.ledger.velocity(self.velocity_window_days)
    }

    /// Durable snapshot of the quota counters, for shutdown.
    pub fn export_accounts(&self) -> Vec<AccountRecord> {
        self.quota.export_records()
    }

    // ── Administration ────────────────────────────────────────────────────

    /// Stage a new rate config. Validated synchronously; takes effect at
    /// the next epoch boundary so per-epoch conservation is never split
    /// across two rate tables.
    pub fn apply_rate_config(&self, proposal: RateConfig) -> Result<(), RateConfigError> {
        proposal.validate()?;
        let mut book = self.rates.write().expect("rate book lock poisoned");
        if proposal.version <= book.active.version {
            return Err(RateConfigError::StaleVersion {
                proposed: proposal.version,
                active: book.active.version,
            });
        }
        tracing::info!(
            version = proposal.version,
            listener_rate = %proposal.listener_rate,
            artist_rate = %proposal.artist_rate,
            "rate config staged for next epoch"
        );
        book.pending = Some(proposal);
        Ok(())
    }

    /// Immediate capacity raise — the administrative escape from soft-cap
    /// mode. The emitted total is unchanged; only headroom is added.
    pub fn raise_capacity(&self, new_capacity: Decimal) -> PoolState {
        let pool = self.ledger.raise_capacity(new_capacity);
        tracing::info!(capacity = %pool.capacity, remaining = %pool.remaining, "pool capacity raised");
        pool
    }

    /// Capacity the next epoch's pool will be created with.
    pub fn set_next_epoch_capacity(&self, capacity: Decimal) {
        *self
            .next_epoch_capacity
            .write()
            .expect("capacity lock poisoned") = capacity;
        tracing::info!(%capacity, "next epoch capacity staged");
    }

    // ── Maintenance cadence ───────────────────────────────────────────────

    /// Advance the pool day and roll the epoch when its last day has
    /// passed. Idempotent; the daemon calls it on every sweep tick.
    pub fn maintain(&self, now: DateTime<Utc>) {
        let today = now.date_naive();
        self.ledger.advance_day(today);
        if !self.ledger.needs_rollover(today) {
            return;
        }

        let capacity = *self
            .next_epoch_capacity
            .read()
            .expect("capacity lock poisoned");
        let epoch_start = aligned_epoch_start(&self.ledger.snapshot().pool, today);
        let pool = self.ledger.rollover(capacity, epoch_start);

        let mut book = self.rates.write().expect("rate book lock poisoned");
        if let Some(pending) = book.pending.take() {
            tracing::info!(version = pending.version, "rate config activated at epoch boundary");
            book.active = pending;
        }
        tracing::info!(
            epoch_start = %pool.epoch_start,
            capacity = %pool.capacity,
            "pool epoch rolled over"
        );
    }

    /// Run every anomaly rule over fresh snapshots and swap the flag board.
    pub fn run_anomaly_sweep(&self, now: DateTime<Utc>) {
        let rates = self.active_rates();
        let mut flags = Vec::new();

        for (account_id, usage) in self.quota.accounts_snapshot() {
            let cap = rates.daily_limit(usage.role);
            flags.extend(anomaly::check_account(
                &account_id,
                &usage,
                cap,
                &self.anomaly,
                now,
            ));
        }

        for (fingerprint, member_ids) in self.quota.shared_fingerprints() {
            let members: Vec<_> = member_ids
                .into_iter()
                .filter_map(|id| {
                    self.quota.get(&id).map(|usage| {
                        let cap = rates.daily_limit(usage.role);
                        (id, usage, cap)
                    })
                })
                .collect();
            if let Some(flag) = anomaly::check_cluster(fingerprint, &members, &self.anomaly, now) {
                flags.push(flag);
            }
        }

        let snap = self.ledger.snapshot();
        let projected_daily = if snap.pool.epoch_days > 0 {
            snap.pool.capacity / Decimal::from(snap.pool.epoch_days)
        } else {
            Decimal::ZERO
        };
        let observed = self.ledger.velocity(self.velocity_window_days);
        if let Some(flag) = anomaly::check_velocity(observed, projected_daily, &self.anomaly, now) {
            flags.push(flag);
        }
        if let Some(flag) = anomaly::check_depletion(&snap.pool, &self.anomaly, now) {
            flags.push(flag);
        }

        if !flags.is_empty() {
            tracing::info!(count = flags.len(), "anomaly sweep raised flags");
        }
        self.flags.replace_all(flags);
    }

    fn active_rates(&self) -> RateConfig {
        self.rates.read().expect("rate book lock poisoned").active.clone()
    }
}

/// First day of the epoch containing `today`, aligned to the original
/// epoch grid even if the process slept across several boundaries.
fn aligned_epoch_start(pool: &PoolState, today: NaiveDate) -> NaiveDate {
    let days = i64::from(pool.epoch_days).max(1);
    let elapsed = (today - pool.epoch_start).num_days().max(0);
    let epochs = (elapsed / days) as u64;
    pool.epoch_start + Days::new(epochs * days as u64)
}
