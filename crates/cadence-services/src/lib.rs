//! cadence-services — the reward-emission engine.
//!
//! Session flow: quota grant → share computation → atomic pool debit →
//! asynchronous durable append. The anomaly detector and sustainability
//! projector read snapshots on their own cadence and never gate emission.

pub mod anomaly;
pub mod emission;
pub mod engine;
pub mod ledger;
pub mod projection;
pub mod quota;
pub mod rate_control;
pub mod store;

pub use anomaly::{AnomalyFlag, FlagBoard, FlagEvidence, FlagKind, FlagScope, Severity};
pub use emission::EmissionShares;
pub use engine::{EmissionOutcome, RatesView, RewardEngine, SessionOutcome, SkipReason};
pub use ledger::{LedgerError, PoolLedger, PoolSnapshot};
pub use projection::{Projection, SustainabilityBand};
pub use quota::{AccountRecord, QuotaSnapshot, QuotaTracker};
pub use rate_control::{RateController, RunwayTarget};
pub use store::{spawn_persistence_task, DurableStore, JsonFileStore, MemoryStore, StoreError};
