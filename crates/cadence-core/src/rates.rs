//! Rate configuration — per-minute emission rates and daily caps.
//!
//! A `RateConfig` is immutable once active. Changes are staged as a new
//! version and swapped in only at the next epoch boundary, so per-epoch
//! conservation arithmetic is never split across two rate tables.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::Role;

/// Versioned emission rates. Defaults match the launch economics:
/// 0.3 / 1.5 DYO per minute, 90 / 120 minute daily caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateConfig {
    pub version: u32,
    /// DYO per granted minute, credited to the listener.
    pub listener_rate: Decimal,
    /// DYO per granted minute, credited to the content's artist.
    pub artist_rate: Decimal,
    /// Daily cap in minutes for listener accounts.
    pub daily_limit_listener: u32,
    /// Daily cap in minutes for artist accounts.
    pub daily_limit_artist: u32,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            version: 1,
            listener_rate: Decimal::new(3, 1),
            artist_rate: Decimal::new(15, 1),
            daily_limit_listener: 90,
            daily_limit_artist: 120,
        }
    }
}

impl RateConfig {
    pub fn rate_for(&self, role: Role) -> Decimal {
        match role {
            Role::Listener => self.listener_rate,
            Role::Artist => self.artist_rate,
        }
    }

    pub fn daily_limit(&self, role: Role) -> u32 {
        match role {
            Role::Listener => self.daily_limit_listener,
            Role::Artist => self.daily_limit_artist,
        }
    }

    /// Combined per-minute rate a single listener-minute costs the pool
    /// (the listener share plus the attributed artist share).
    pub fn total_rate(&self) -> Decimal {
        self.listener_rate + self.artist_rate
    }

    /// Reject configs that could never be activated.
    pub fn validate(&self) -> Result<(), RateConfigError> {
        if self.listener_rate <= Decimal::ZERO || self.artist_rate <= Decimal::ZERO {
            return Err(RateConfigError::NonPositiveRate);
        }
        if self.daily_limit_listener == 0 || self.daily_limit_artist == 0 {
            return Err(RateConfigError::NonPositiveCap);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateConfigError {
    #[error("rates must be positive")]
    NonPositiveRate,
    #[error("daily caps must be positive")]
    NonPositiveCap,
    #[error("artist:listener ratio must be positive")]
    InvalidRatio,
    #[error("target runway must be at least one day")]
    InvalidRunway,
    #[error("engaged minutes per day must be positive")]
    NoEngagedMinutes,
    #[error("config version {proposed} is not newer than active version {active}")]
    StaleVersion { proposed: u32, active: u32 },
}
