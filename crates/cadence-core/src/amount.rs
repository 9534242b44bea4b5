//! Fixed-point DYO arithmetic.
//!
//! Every amount that leaves this crate carries exactly two fractional digits,
//! rounded half-even. Rounding happens at one choke point so that summing
//! emitted shares across an entire epoch reproduces the ledger balance
//! exactly — no accumulated float drift.

use rust_decimal::{Decimal, RoundingStrategy};

/// Fractional digits carried by every DYO amount.
pub const AMOUNT_SCALE: u32 = 2;

/// Fractional digits carried by per-minute rates.
pub const RATE_SCALE: u32 = 4;

/// Round a raw amount to the canonical 2-digit scale, half-even.
pub fn round_amount(raw: Decimal) -> Decimal {
    raw.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointNearestEven)
}

/// Round a per-minute rate to the 4-digit scale, half-even.
pub fn round_rate(raw: Decimal) -> Decimal {
    raw.round_dp_with_strategy(RATE_SCALE, RoundingStrategy::MidpointNearestEven)
}

/// Whole DYO units as an amount.
pub fn dyo(units: i64) -> Decimal {
    Decimal::new(units, 0)
}
