//! Sustainability projection — pool runway from emission velocity.
//!
//! Pure and side-effect-free: the same function backs ad hoc what-if
//! queries and the daemon's continuous alerting. Nothing here reads live
//! state; callers pass snapshots in.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cadence_core::amount::round_amount;
use cadence_core::rates::RateConfig;

/// Runway classification. Thresholds are in epoch-lengths: a year of
/// runway is excellent, half a year is good, anything shorter needs
/// attention. A velocity whose projected epoch total exceeds the capacity
/// cannot finish the epoch at all — insufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SustainabilityBand {
    Excellent,
    Good,
    Attention,
    Insufficient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Days until exhaustion at the given velocity. `None` when the
    /// velocity is zero (indefinite runway).
    pub days_remaining: Option<Decimal>,
    /// `velocity × epoch_days` — what one full epoch would emit.
    pub projected_epoch_total: Decimal,
    pub band: SustainabilityBand,
}

/// Project pool runway at a constant emission velocity.
pub fn project(
    remaining: Decimal,
    velocity_per_day: Decimal,
    epoch_days: u32,
    capacity: Decimal,
) -> Projection {
    if velocity_per_day <= Decimal::ZERO {
        return Projection {
            days_remaining: None,
            projected_epoch_total: Decimal::ZERO,
            band: SustainabilityBand::Excellent,
        };
    }

    let days = round_amount(remaining / velocity_per_day);
    let projected_epoch_total = velocity_per_day * Decimal::from(epoch_days);

    let band = if projected_epoch_total > capacity {
        SustainabilityBand::Insufficient
    } else if days >= Decimal::from(12 * epoch_days) {
        SustainabilityBand::Excellent
    } else if days >= Decimal::from(6 * epoch_days) {
        SustainabilityBand::Good
    } else {
        SustainabilityBand::Attention
    };

    Projection {
        days_remaining: Some(days),
        projected_epoch_total,
        band,
    }
}

/// What-if input: a cohort of listeners streaming a daily average.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioInput {
    pub listeners: u64,
    pub avg_minutes_per_day: u32,
}

/// Project a hypothetical cohort against a full pool. Minutes are clamped
/// to the listener daily cap; every listener-minute costs the pool the
/// combined listener+artist rate, since the streamed content's artist is
/// credited alongside the listener.
pub fn scenario(
    input: &ScenarioInput,
    rates: &RateConfig,
    capacity: Decimal,
    epoch_days: u32,
) -> Projection {
    let minutes = input.avg_minutes_per_day.min(rates.daily_limit_listener);
    let velocity =
        Decimal::from(input.listeners) * Decimal::from(minutes) * rates.total_rate();
    project(capacity, velocity, epoch_days, capacity)
}
