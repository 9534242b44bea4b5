//! Configuration system for Cadence.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CADENCE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/cadence/config.toml
//!   3. ~/.config/cadence/config.toml

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::rates::RateConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub pool: PoolConfig,
    pub rates: RateConfig,
    pub anomaly: AnomalyConfig,
    pub monitor: MonitorConfig,
    pub api: ApiConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Pool budget per monthly epoch, in whole DYO.
    pub monthly_capacity: u64,
    /// Epoch length in days.
    pub epoch_days: u32,
}

/// Thresholds for the rule-based anomaly detector. All rules are
/// independently tunable; defaults come from the launch economics audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Consecutive fully-saturated days before LimitSaturation fires.
    pub saturation_streak_days: u32,
    /// Single-session duration considered continuous, in minutes.
    pub continuous_session_minutes: u32,
    /// Max gap to the previous session for it to count as continuous.
    pub max_session_gap_minutes: i64,
    /// Distinct saturating accounts on one fingerprint before IpCluster fires.
    pub ip_cluster_accounts: usize,
    /// EmissionVelocity fires when realized velocity exceeds
    /// `projected_daily_rate × velocity_multiplier`.
    pub velocity_multiplier: Decimal,
    /// Slack subtracted from the linear-depletion expectation before
    /// PoolDepletionPace fires, as a fraction of capacity.
    pub depletion_slack: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between anomaly sweeps / rollover checks in the daemon.
    pub sweep_interval_secs: u64,
    /// Trailing window for the realized emission velocity, in days.
    pub velocity_window_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Local port for the query API.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory for the durable pool/account/emission files.
    pub data_path: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            rates: RateConfig::default(),
            anomaly: AnomalyConfig::default(),
            monitor: MonitorConfig::default(),
            api: ApiConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            monthly_capacity: 1_000_000,
            epoch_days: 30,
        }
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            saturation_streak_days: 1,
            continuous_session_minutes: 60,
            max_session_gap_minutes: 0,
            ip_cluster_accounts: 3,
            velocity_multiplier: Decimal::new(15, 1),
            depletion_slack: Decimal::new(15, 2),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            velocity_window_days: 7,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 7410 }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_path: data_dir().join("ledger"),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("cadence")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("cadence")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl CadenceConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            CadenceConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CADENCE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&CadenceConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply CADENCE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CADENCE_POOL__MONTHLY_CAPACITY") {
            if let Ok(c) = v.parse() {
                self.pool.monthly_capacity = c;
            }
        }
        if let Ok(v) = std::env::var("CADENCE_POOL__EPOCH_DAYS") {
            if let Ok(d) = v.parse() {
                self.pool.epoch_days = d;
            }
        }
        if let Ok(v) = std::env::var("CADENCE_API__PORT") {
            if let Ok(p) = v.parse() {
                self.api.port = p;
            }
        }
        if let Ok(v) = std::env::var("CADENCE_MONITOR__SWEEP_INTERVAL_SECS") {
            if let Ok(s) = v.parse() {
                self.monitor.sweep_interval_secs = s;
            }
        }
        if let Ok(v) = std::env::var("CADENCE_STORE__DATA_PATH") {
            self.store.data_path = PathBuf::from(v);
        }
    }
}
