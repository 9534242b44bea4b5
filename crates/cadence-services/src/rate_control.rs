//! Rate controller — corrective rate and capacity proposals.
//!
//! Two independent operator levers toward a target runway: lower the rates
//! holding capacity fixed, or raise the capacity holding rates fixed. The
//! controller only proposes; activation goes through the engine's
//! `apply_rate_config`, which stages the new version for the next epoch
//! boundary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cadence_core::amount::{round_amount, round_rate};
use cadence_core::rates::{RateConfig, RateConfigError};

/// Inputs every proposal needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunwayTarget {
    pub target_runway_days: u32,
    /// Total engaged listener-minutes per day, across all accounts.
    pub total_listening_minutes_per_day: u64,
}

/// Computes corrective proposals preserving a configured artist:listener
/// split (default 5:1, matching the launch rates 1.5 : 0.3).
#[derive(Debug, Clone)]
pub struct RateController {
    /// Artist rate divided by listener rate.
    ratio_artist_to_listener: Decimal,
}

impl Default for RateController {
    fn default() -> Self {
        Self {
            ratio_artist_to_listener: Decimal::from(5u32),
        }
    }
}

impl RateController {
    pub fn new(ratio_artist_to_listener: Decimal) -> Result<Self, RateConfigError> {
        if ratio_artist_to_listener <= Decimal::ZERO {
            return Err(RateConfigError::InvalidRatio);
        }
        Ok(Self {
            ratio_artist_to_listener,
        })
    }

    /// Propose rates that make `capacity` last `target_runway_days` at the
    /// given engagement, keeping the artist:listener split. Daily caps and
    /// the version lineage carry over from the current config.
    pub fn propose_rates(
        &self,
        current: &RateConfig,
        capacity: Decimal,
        target: &RunwayTarget,
    ) -> Result<RateConfig, RateConfigError> {
        if target.target_runway_days == 0 {
            return Err(RateConfigError::InvalidRunway);
        }
        if target.total_listening_minutes_per_day == 0 {
            return Err(RateConfigError::NoEngagedMinutes);
        }
        if capacity <= Decimal::ZERO {
            return Err(RateConfigError::NonPositiveCap);
        }

        let total_rate = capacity
            / (Decimal::from(target.target_runway_days)
                * Decimal::from(target.total_listening_minutes_per_day));
        // total = listener × (1 + ratio); round each leg from the exact
        // listener rate so the split stays true to the ratio
        let listener_exact = total_rate / (Decimal::ONE + self.ratio_artist_to_listener);
        let proposed = RateConfig {
            version: current.version + 1,
            listener_rate: round_rate(listener_exact),
            artist_rate: round_rate(listener_exact * self.ratio_artist_to_listener),
            daily_limit_listener: current.daily_limit_listener,
            daily_limit_artist: current.daily_limit_artist,
        };
        proposed.validate()?;
        Ok(proposed)
    }

    /// Propose the capacity that sustains the *current* daily spend for
    /// `target_runway_days`, holding rates fixed.
    pub fn propose_capacity(
        &self,
        current_daily_spend: Decimal,
        target_runway_days: u32,
    ) -> Result<Decimal, RateConfigError> {
        if target_runway_days == 0 {
            return Err(RateConfigError::InvalidRunway);
        }
        if current_daily_spend <= Decimal::ZERO {
            return Err(RateConfigError::NoEngagedMinutes);
        }
        Ok(round_amount(
            current_daily_spend * Decimal::from(target_runway_days),
        ))
    }
}
