//! Emission calculation — granted minutes to token shares.
//!
//! Shares are computed from *committed* minutes (post-cap), never from the
//! raw request, and each share is rounded once at the canonical 2-digit
//! scale. The debit amount is the sum of the two already-rounded shares, so
//! ledger sums reproduce the conservation invariant exactly no matter how
//! many sessions flow through.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cadence_core::amount::round_amount;
use cadence_core::rates::RateConfig;

/// The listener and artist shares produced by one session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmissionShares {
    pub listener: Decimal,
    pub artist: Decimal,
}

impl EmissionShares {
    /// Total pool cost of this emission.
    pub fn total(&self) -> Decimal {
        self.listener + self.artist
    }
}

/// Compute shares for `granted_minutes` under the active rates.
pub fn compute(granted_minutes: u32, rates: &RateConfig) -> EmissionShares {
    let minutes = Decimal::from(granted_minutes);
    EmissionShares {
        listener: round_amount(minutes * rates.listener_rate),
        artist: round_amount(minutes * rates.artist_rate),
    }
}
