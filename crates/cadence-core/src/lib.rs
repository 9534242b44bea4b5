//! cadence-core — shared domain types, fixed-point money, and configuration.
//! All other Cadence crates depend on this one.

pub mod amount;
pub mod config;
pub mod rates;
pub mod types;

pub use rates::{RateConfig, RateConfigError};
pub use types::{AccountId, EmissionRecord, Fingerprint, PoolState, Role, Session};
