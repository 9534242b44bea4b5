//! Pool ledger — the only write path to the shared pool balance.
//!
//! One mutex guards the balance check, the decrement, and the record
//! append, so a debit is a single atomic step: no lost updates and no
//! balance ever crossing zero. Callers compute shares *before* calling in;
//! the critical section is pure bookkeeping.
//!
//! A failed debit appends nothing and puts the epoch into soft-cap mode:
//! further debits keep failing until epoch rollover or an administrative
//! capacity raise.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cadence_core::types::{AccountId, EmissionRecord, PoolState};

use crate::emission::EmissionShares;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("pool exhausted: {remaining} DYO remaining, {requested} requested")]
    PoolExhausted {
        remaining: Decimal,
        requested: Decimal,
    },
}

/// What a debit is attributed to.
#[derive(Debug, Clone)]
pub struct SessionRef {
    pub account_id: AccountId,
    pub content_id: String,
    pub artist_id: AccountId,
}

/// Read-only view of the pool, safe to hand to detectors and the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub pool: PoolState,
    /// `capacity − remaining`; equals the sum of this epoch's records.
    pub emitted_this_epoch: Decimal,
    pub record_count: usize,
    pub last_sequence: u64,
    pub soft_capped: bool,
}

struct LedgerInner {
    pool: PoolState,
    /// Next record sequence. Monotonic across epoch rollovers.
    next_sequence: u64,
    /// Records of the current epoch, in sequence order.
    records: Vec<EmissionRecord>,
    /// Total debited per epoch day, indexed by day_index.
    daily_debits: Vec<Decimal>,
    soft_capped: bool,
}

/// The shared, atomically-debited pool. Cheap to clone; all clones share
/// one serialization point.
#[derive(Clone)]
pub struct PoolLedger {
    inner: Arc<Mutex<LedgerInner>>,
}

impl PoolLedger {
    pub fn new(pool: PoolState) -> Self {
        Self::recover(pool, 0)
    }

    /// Rebuild from a persisted pool state and the last durably-appended
    /// sequence number.
    pub fn recover(pool: PoolState, last_sequence: u64) -> Self {
        let days = pool.day_index as usize + 1;
        Self {
            inner: Arc::new(Mutex::new(LedgerInner {
                pool,
                next_sequence: last_sequence + 1,
                records: Vec::new(),
                daily_debits: vec![Decimal::ZERO; days],
                soft_capped: false,
            })),
        }
    }

    /// Atomically debit the pool for one emission. On success the record is
    /// appended with the next sequence number and returned for persistence.
    pub fn debit(
        &self,
        shares: &EmissionShares,
        session: &SessionRef,
        now: DateTime<Utc>,
    ) -> Result<EmissionRecord, LedgerError> {
        let amount = shares.total();
        let mut inner = self.inner.lock().expect("ledger mutex poisoned");

        if inner.pool.remaining < amount {
            inner.soft_capped = true;
            return Err(LedgerError::PoolExhausted {
                remaining: inner.pool.remaining,
                requested: amount,
            });
        }

        inner.pool.remaining -= amount;
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;

        let day_index = inner.pool.day_index;
        let slot = day_index as usize;
        if inner.daily_debits.len() <= slot {
            inner.daily_debits.resize(slot + 1, Decimal::ZERO);
        }
        inner.daily_debits[slot] += amount;

        let record = EmissionRecord {
            sequence,
            account_id: session.account_id.clone(),
            content_id: session.content_id.clone(),
            artist_id: session.artist_id.clone(),
            listener_share: shares.listener,
            artist_share: shares.artist,
            balance_after: inner.pool.remaining,
            day_index,
            recorded_at: now,
        };
        inner.records.push(record.clone());
        Ok(record)
    }

    /// Advance `day_index` to match the calendar. Idempotent; no-op within
    /// the same day or past the epoch end (rollover handles that).
    pub fn advance_day(&self, today: NaiveDate) {
        let mut inner = self.inner.lock().expect("ledger mutex poisoned");
        let elapsed = (today - inner.pool.epoch_start).num_days();
        if elapsed <= 0 {
            return;
        }
        let capped = (elapsed as u32).min(inner.pool.epoch_days.saturating_sub(1));
        if capped > inner.pool.day_index {
            inner.pool.day_index = capped;
            // Keep one slot per elapsed day so velocity windows line up
            inner.daily_debits.resize(capped as usize + 1, Decimal::ZERO);
        }
    }

    /// Whether `today` lies past the end of the current epoch.
    pub fn needs_rollover(&self, today: NaiveDate) -> bool {
        let inner = self.inner.lock().expect("ledger mutex poisoned");
        inner.pool.epoch_elapsed(today)
    }

    /// Replace the pool for a new epoch. The old PoolState is dropped, not
    /// reset; sequence numbering continues across the boundary. Returns the
    /// fresh state.
    pub fn rollover(&self, capacity: Decimal, epoch_start: NaiveDate) -> PoolState {
        let mut inner = self.inner.lock().expect("ledger mutex poisoned");
        let epoch_days = inner.pool.epoch_days;
        inner.pool = PoolState::new(capacity, epoch_start, epoch_days);
        inner.records.clear();
        inner.daily_debits = vec![Decimal::ZERO; 1];
        inner.soft_capped = false;
        inner.pool.clone()
    }

    /// Administrative mid-epoch capacity raise. Adds the difference to the
    /// remaining balance so `capacity − remaining` (the emitted total) is
    /// unchanged, and lifts the soft cap.
    pub fn raise_capacity(&self, new_capacity: Decimal) -> PoolState {
        let mut inner = self.inner.lock().expect("ledger mutex poisoned");
        let delta = new_capacity - inner.pool.capacity;
        if delta > Decimal::ZERO {
            inner.pool.capacity = new_capacity;
            inner.pool.remaining += delta;
            inner.soft_capped = false;
        }
        inner.pool.clone()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let inner = self.inner.lock().expect("ledger mutex poisoned");
        PoolSnapshot {
            pool: inner.pool.clone(),
            emitted_this_epoch: inner.pool.capacity - inner.pool.remaining,
            record_count: inner.records.len(),
            last_sequence: inner.next_sequence - 1,
            soft_capped: inner.soft_capped,
        }
    }

    /// Records of the current epoch with sequence greater than `after`.
    pub fn records_since(&self, after: u64) -> Vec<EmissionRecord> {
        let inner = self.inner.lock().expect("ledger mutex poisoned");
        inner
            .records
            .iter()
            .filter(|r| r.sequence > after)
            .cloned()
            .collect()
    }

    /// Realized emission velocity: average DYO debited per day over the
    /// trailing `window_days` (clamped to the days elapsed this epoch).
    pub fn velocity(&self, window_days: u32) -> Decimal {
        let inner = self.inner.lock().expect("ledger mutex poisoned");
        let elapsed = inner.pool.day_index as usize + 1;
        let window = (window_days.max(1) as usize).min(elapsed);
        let total: Decimal = inner
            .daily_debits
            .iter()
            .rev()
            .take(window)
            .copied()
            .sum();
        total / Decimal::from(window as u64)
    }
}
