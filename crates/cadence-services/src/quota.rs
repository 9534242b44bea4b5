//! Quota tracking — per-account daily usage accounting and cap enforcement.
//!
//! Grants truncate gracefully: a request past the cap gets the minutes that
//! are left, not an error. The day boundary reset is a compare-and-reset
//! performed under the per-account entry lock, so it happens exactly once
//! per boundary no matter how many sessions race across it. Accounts are
//! fully independent — only operations on the *same* account serialize.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use cadence_core::types::{AccountId, Fingerprint, Role};

/// Bounded per-account session history kept for the anomaly detector.
const HISTORY_CAP: usize = 32;

/// One committed session, as remembered in the account history.
#[derive(Debug, Clone)]
pub struct SessionSample {
    pub content_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub committed_minutes: u32,
}

/// Mutable per-account state. Lives inside the tracker's map; all access
/// goes through the entry lock.
#[derive(Debug, Clone)]
pub struct AccountUsage {
    pub role: Role,
    pub used_minutes_today: u32,
    /// Date of the last daily reset.
    pub day_epoch: NaiveDate,
    /// Completed consecutive days at 100% of the cap, ending at
    /// `last_saturated`.
    pub saturation_streak: u32,
    pub last_saturated: Option<NaiveDate>,
    pub history: VecDeque<SessionSample>,
    pub fingerprints: HashSet<Fingerprint>,
}

impl AccountUsage {
    fn new(role: Role, day: NaiveDate) -> Self {
        Self {
            role,
            used_minutes_today: 0,
            day_epoch: day,
            saturation_streak: 0,
            last_saturated: None,
            history: VecDeque::new(),
            fingerprints: HashSet::new(),
        }
    }

    /// Saturation streak as observed right now, counting today if today is
    /// already at the cap.
    pub fn effective_streak(&self, cap: u32, today: NaiveDate) -> u32 {
        if cap == 0 || self.used_minutes_today < cap || self.day_epoch != today {
            return 0;
        }
        let yesterday = today.checked_sub_days(Days::new(1));
        if self.last_saturated.is_some() && self.last_saturated == yesterday {
            self.saturation_streak + 1
        } else {
            1
        }
    }

    /// Whether the account has consumed its full cap for the current day.
    pub fn saturated(&self, cap: u32) -> bool {
        cap > 0 && self.used_minutes_today >= cap
    }

    /// Fold the finished day into the streak and reset the daily counter.
    /// Idempotent per boundary: a second caller sees `day_epoch == today`
    /// and does nothing.
    fn roll_day(&mut self, cap: u32, today: NaiveDate) {
        if self.day_epoch == today {
            return;
        }
        if self.saturated(cap) {
            let prev = self.day_epoch.checked_sub_days(Days::new(1));
            if self.last_saturated.is_some() && self.last_saturated == prev {
                self.saturation_streak += 1;
            } else {
                self.saturation_streak = 1;
            }
            self.last_saturated = Some(self.day_epoch);
        }
        self.used_minutes_today = 0;
        self.day_epoch = today;
    }
}

/// Read-only view of an account's quota standing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub account_id: AccountId,
    pub role: Role,
    pub used_minutes_today: u32,
    pub cap_minutes: u32,
    pub remaining_minutes: u32,
    pub day_epoch: NaiveDate,
}

/// Durable form of an account, for startup recovery. Session history and
/// fingerprints are observational and rebuild naturally; only the quota
/// counters survive a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account_id: AccountId,
    pub role: Role,
    pub used_minutes_today: u32,
    pub day_epoch: NaiveDate,
    pub saturation_streak: u32,
    pub last_saturated: Option<NaiveDate>,
}

/// Per-account daily usage accounting, shared across all engine tasks.
#[derive(Clone, Default)]
pub struct QuotaTracker {
    accounts: Arc<DashMap<AccountId, AccountUsage>>,
    /// Reverse index: fingerprint → accounts seen on it.
    by_fingerprint: Arc<DashMap<Fingerprint, HashSet<AccountId>>>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many of `requested_minutes` the account may use today. Rolls the
    /// day over first if `now` has crossed a boundary. Returns 0 when the
    /// cap is already consumed; never fails.
    ///
    /// Nothing is reserved — the grant is advisory until `commit_usage`.
    pub fn check_and_reserve(
        &self,
        account_id: &AccountId,
        role: Role,
        requested_minutes: u32,
        cap: u32,
        now: DateTime<Utc>,
    ) -> u32 {
        let today = now.date_naive();
        let mut entry = self
            .accounts
            .entry(account_id.clone())
            .or_insert_with(|| AccountUsage::new(role, today));
        entry.roll_day(cap, today);
        requested_minutes.min(cap.saturating_sub(entry.used_minutes_today))
    }

    /// Record actually-consumed minutes after the session happened. Clamps
    /// to the cap under the entry lock, so concurrent commits for one
    /// account cannot race past it. Returns the minutes actually counted.
    pub fn commit_usage(
        &self,
        account_id: &AccountId,
        role: Role,
        minutes: u32,
        cap: u32,
        sample: SessionSample,
        now: DateTime<Utc>,
    ) -> u32 {
        let today = now.date_naive();
        let mut entry = self
            .accounts
            .entry(account_id.clone())
            .or_insert_with(|| AccountUsage::new(role, today));
        entry.roll_day(cap, today);

        let committed = minutes.min(cap.saturating_sub(entry.used_minutes_today));
        entry.used_minutes_today += committed;

        let mut sample = sample;
        sample.committed_minutes = committed;
        if entry.history.len() == HISTORY_CAP {
            entry.history.pop_front();
        }
        entry.history.push_back(sample);
        committed
    }

    /// Associate a fingerprint with an account, maintaining the reverse
    /// index used by the Sybil-cluster rule.
    pub fn record_fingerprint(&self, account_id: &AccountId, fingerprint: Fingerprint) {
        if let Some(mut entry) = self.accounts.get_mut(account_id) {
            entry.fingerprints.insert(fingerprint);
        }
        self.by_fingerprint
            .entry(fingerprint)
            .or_default()
            .insert(account_id.clone());
    }

    /// Current quota standing for one account. Applies any pending day
    /// rollover so the view is never stale across a boundary.
    pub fn quota_snapshot(
        &self,
        account_id: &AccountId,
        cap: u32,
        now: DateTime<Utc>,
    ) -> Option<QuotaSnapshot> {
        let today = now.date_naive();
        let mut entry = self.accounts.get_mut(account_id)?;
        entry.roll_day(cap, today);
        Some(QuotaSnapshot {
            account_id: account_id.clone(),
            role: entry.role,
            used_minutes_today: entry.used_minutes_today,
            cap_minutes: cap,
            remaining_minutes: cap.saturating_sub(entry.used_minutes_today),
            day_epoch: entry.day_epoch,
        })
    }

    /// Clone of every account's state, for the anomaly sweep. Read-only;
    /// tolerates being slightly stale by design.
    pub fn accounts_snapshot(&self) -> Vec<(AccountId, AccountUsage)> {
        self.accounts
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Fingerprints shared by more than one account, with their members.
    pub fn shared_fingerprints(&self) -> Vec<(Fingerprint, Vec<AccountId>)> {
        self.by_fingerprint
            .iter()
            .filter(|e| e.value().len() > 1)
            .map(|e| {
                let mut members: Vec<AccountId> = e.value().iter().cloned().collect();
                members.sort();
                (*e.key(), members)
            })
            .collect()
    }

    pub fn get(&self, account_id: &AccountId) -> Option<AccountUsage> {
        self.accounts.get(account_id).map(|e| e.clone())
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Durable snapshot of all accounts.
    pub fn export_records(&self) -> Vec<AccountRecord> {
        let mut records: Vec<AccountRecord> = self
            .accounts
            .iter()
            .map(|e| AccountRecord {
                account_id: e.key().clone(),
                role: e.value().role,
                used_minutes_today: e.value().used_minutes_today,
                day_epoch: e.value().day_epoch,
                saturation_streak: e.value().saturation_streak,
                last_saturated: e.value().last_saturated,
            })
            .collect();
        records.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        records
    }

    /// Rebuild tracker state from a durable snapshot.
    pub fn restore(records: Vec<AccountRecord>) -> Self {
        let tracker = Self::new();
        for record in records {
            tracker.accounts.insert(
                record.account_id.clone(),
                AccountUsage {
                    role: record.role,
                    used_minutes_today: record.used_minutes_today,
                    day_epoch: record.day_epoch,
                    saturation_streak: record.saturation_streak,
                    last_saturated: record.last_saturated,
                    history: VecDeque::new(),
                    fingerprints: HashSet::new(),
                },
            );
        }
        tracker
    }
}
