//! Durable store contract and the asynchronous persistence pipeline.
//!
//! The in-memory ledger is authoritative; persistence is at-least-once and
//! idempotent on the record sequence number. A failed append is retried in
//! the background with bounded backoff and never rolls back or delays a
//! debit — nothing on the emission path waits on I/O.

use std::io::{BufRead, Write as _};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use cadence_core::types::{EmissionRecord, PoolState};

use crate::quota::AccountRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Contract with the durable layer. All failures are retryable; callers
/// key retries by `EmissionRecord::sequence`.
pub trait DurableStore: Send + Sync {
    fn append_emission_record(&self, record: &EmissionRecord) -> Result<(), StoreError>;
    fn save_pool_state(&self, pool: &PoolState) -> Result<(), StoreError>;
    fn load_pool_state(&self) -> Result<Option<PoolState>, StoreError>;
    fn save_accounts(&self, accounts: &[AccountRecord]) -> Result<(), StoreError>;
    fn load_accounts(&self) -> Result<Vec<AccountRecord>, StoreError>;
    /// Highest sequence durably appended so far; 0 when empty.
    fn last_sequence(&self) -> Result<u64, StoreError>;
}

// ── JSON file store ───────────────────────────────────────────────────────────

/// File-backed store: `pool.json` and `accounts.json` snapshots plus an
/// append-only `emissions.jsonl` log, one record per line.
pub struct JsonFileStore {
    dir: PathBuf,
    /// Highest sequence appended to the log. Appends at or below this are
    /// duplicates from a retry and are skipped.
    appended: AtomicU64,
}

impl JsonFileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let appended = Self::scan_last_sequence(&dir.join("emissions.jsonl"))?;
        Ok(Self {
            dir,
            appended: AtomicU64::new(appended),
        })
    }

    fn scan_last_sequence(path: &Path) -> Result<u64, StoreError> {
        let file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut last = 0u64;
        for line in std::io::BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: EmissionRecord = serde_json::from_str(&line)?;
            last = last.max(record.sequence);
        }
        Ok(last)
    }

    fn write_json<T: serde::Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let path = self.dir.join(name);
        let text = serde_json::to_string_pretty(value)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Option<T>, StoreError> {
        let path = self.dir.join(name);
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }
}

impl DurableStore for JsonFileStore {
    fn append_emission_record(&self, record: &EmissionRecord) -> Result<(), StoreError> {
        // Idempotent on sequence: retried duplicates are dropped
        if record.sequence <= self.appended.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join("emissions.jsonl"))?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        self.appended.fetch_max(record.sequence, Ordering::AcqRel);
        Ok(())
    }

    fn save_pool_state(&self, pool: &PoolState) -> Result<(), StoreError> {
        self.write_json("pool.json", pool)
    }

    fn load_pool_state(&self) -> Result<Option<PoolState>, StoreError> {
        self.read_json("pool.json")
    }

    fn save_accounts(&self, accounts: &[AccountRecord]) -> Result<(), StoreError> {
        self.write_json("accounts.json", &accounts)
    }

    fn load_accounts(&self) -> Result<Vec<AccountRecord>, StoreError> {
        Ok(self.read_json("accounts.json")?.unwrap_or_default())
    }

    fn last_sequence(&self) -> Result<u64, StoreError> {
        Ok(self.appended.load(Ordering::Acquire))
    }
}

// ── In-memory store ───────────────────────────────────────────────────────────

/// Test double: keeps everything in memory and can be told to fail the
/// next N appends to exercise the retry path.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<EmissionRecord>>,
    pool: Mutex<Option<PoolState>>,
    accounts: Mutex<Vec<AccountRecord>>,
    fail_appends: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` appends return an error.
    pub fn fail_next_appends(&self, n: u64) {
        self.fail_appends.store(n, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<EmissionRecord> {
        self.records.lock().expect("memory store lock").clone()
    }
}

impl DurableStore for MemoryStore {
    fn append_emission_record(&self, record: &EmissionRecord) -> Result<(), StoreError> {
        let pending = self.fail_appends.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_appends.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected append failure",
            )));
        }
        let mut records = self.records.lock().expect("memory store lock");
        if records.iter().all(|r| r.sequence != record.sequence) {
            records.push(record.clone());
        }
        Ok(())
    }

    fn save_pool_state(&self, pool: &PoolState) -> Result<(), StoreError> {
        *self.pool.lock().expect("memory store lock") = Some(pool.clone());
        Ok(())
    }

    fn load_pool_state(&self) -> Result<Option<PoolState>, StoreError> {
        Ok(self.pool.lock().expect("memory store lock").clone())
    }

    fn save_accounts(&self, accounts: &[AccountRecord]) -> Result<(), StoreError> {
        *self.accounts.lock().expect("memory store lock") = accounts.to_vec();
        Ok(())
    }

    fn load_accounts(&self) -> Result<Vec<AccountRecord>, StoreError> {
        Ok(self.accounts.lock().expect("memory store lock").clone())
    }

    fn last_sequence(&self) -> Result<u64, StoreError> {
        Ok(self
            .records
            .lock()
            .expect("memory store lock")
            .iter()
            .map(|r| r.sequence)
            .max()
            .unwrap_or(0))
    }
}

// ── Persistence task ──────────────────────────────────────────────────────────

const RETRY_BASE: Duration = Duration::from_millis(50);
const RETRY_CAP: Duration = Duration::from_secs(5);

/// Drain emission records from the engine and append them durably,
/// retrying each record until it lands. Records arrive in sequence order
/// and are appended in order; a stuck store backs the queue up without
/// ever touching the emission path.
pub fn spawn_persistence_task(
    store: Arc<dyn DurableStore>,
    mut rx: mpsc::UnboundedReceiver<EmissionRecord>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            let mut backoff = RETRY_BASE;
            loop {
                match store.append_emission_record(&record) {
                    Ok(()) => break,
                    Err(e) => {
                        tracing::warn!(
                            sequence = record.sequence,
                            error = %e,
                            retry_in_ms = backoff.as_millis() as u64,
                            "emission append failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(RETRY_CAP);
                    }
                }
            }
        }
        tracing::debug!("persistence channel closed, task exiting");
    })
}
