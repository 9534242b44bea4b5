//! Core domain types shared across the Cadence crates.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Opaque account identifier, assigned by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account role — determines the per-minute rate and the daily cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Listener,
    Artist,
}

/// Device/IP fingerprint — a BLAKE3 hash of the raw device-id and address
/// strings. Only the hash is ever stored or logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    /// Derive a fingerprint from a device identifier and source address.
    pub fn derive(device_id: &str, addr: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(device_id.as_bytes());
        hasher.update(b"\x00");
        hasher.update(addr.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// A completed listening session, as delivered by the session source.
/// Cadence only consumes these — ingestion, ordering, and transport are
/// owned elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub account_id: AccountId,
    pub role: Role,
    /// Content that was streamed.
    pub content_id: String,
    /// Account credited with the artist share.
    pub artist_id: AccountId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Minutes the client claims were streamed. Subject to the daily cap.
    pub requested_minutes: u32,
    /// Device/IP fingerprint, when the session source supplies one.
    pub fingerprint: Option<Fingerprint>,
}

impl Session {
    /// Session duration in whole minutes, from the timestamps.
    pub fn duration_minutes(&self) -> u32 {
        (self.end - self.start).num_minutes().max(0) as u32
    }
}

/// The shared reward pool for one monthly epoch.
///
/// Created at epoch start, mutated only by the ledger's debit path, and
/// replaced — never reset in place — at epoch rollover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolState {
    /// Budget for this epoch, in DYO.
    pub capacity: Decimal,
    /// Undistributed balance. Never negative.
    pub remaining: Decimal,
    pub epoch_start: NaiveDate,
    /// Epoch length in days (monthly pool: 30).
    pub epoch_days: u32,
    /// Zero-based day within the epoch.
    pub day_index: u32,
}

impl PoolState {
    pub fn new(capacity: Decimal, epoch_start: NaiveDate, epoch_days: u32) -> Self {
        Self {
            capacity,
            remaining: capacity,
            epoch_start,
            epoch_days,
            day_index: 0,
        }
    }

    /// Fraction of the capacity still undistributed, in [0, 1].
    pub fn fraction_remaining(&self) -> Decimal {
        if self.capacity.is_zero() {
            Decimal::ZERO
        } else {
            self.remaining / self.capacity
        }
    }

    /// Whether `date` falls past the end of this epoch.
    pub fn epoch_elapsed(&self, date: NaiveDate) -> bool {
        (date - self.epoch_start).num_days() >= i64::from(self.epoch_days)
    }
}

/// One successful pool debit. Append-only; owned exclusively by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionRecord {
    /// Monotonically increasing across the life of the ledger, including
    /// epoch rollovers. Persistence is idempotent on this key.
    pub sequence: u64,
    pub account_id: AccountId,
    pub content_id: String,
    pub artist_id: AccountId,
    pub listener_share: Decimal,
    pub artist_share: Decimal,
    /// Pool balance immediately after this debit.
    pub balance_after: Decimal,
    pub day_index: u32,
    pub recorded_at: DateTime<Utc>,
}

impl EmissionRecord {
    /// Total amount this record removed from the pool.
    pub fn total(&self) -> Decimal {
        self.listener_share + self.artist_share
    }
}
