// Durable storage for aggregate vehicle stats
// One JSON object keyed by kind name, written whole on every flush

use crate::error::{Result, StatsError};
use crate::stats::{self, StatsTable};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Read/write contract for the authoritative state
pub trait StateStore: Send {
    /// Load the persisted table. A store with nothing saved yet returns an empty table.
    fn read_state(&self) -> Result<StatsTable>;

    /// Replace the persisted table
    fn write_state(&mut self, table: &StatsTable) -> Result<()>;

    /// Where the state lives, for log lines
    fn location(&self) -> String;
}

/// Stats file on local disk
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for JsonFileStore {
    fn read_state(&self) -> Result<StatsTable> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No stats file yet, starting empty");
            return Ok(StatsTable::new());
        }

        let contents = std::fs::read_to_string(&self.path).map_err(|source| {
            StatsError::PersistenceRead { path: self.path.clone(), source }
        })?;

        if contents.trim().is_empty() {
            return Ok(StatsTable::new());
        }

        let raw: StatsTable = serde_json::from_str(&contents).map_err(|source| {
            StatsError::CorruptState { path: self.path.clone(), source }
        })?;

        let (table, repaired) = stats::sanitize(raw);
        if repaired > 0 {
            warn!(path = %self.path.display(), repaired, "Repaired invalid records in stats file");
        }

        info!(path = %self.path.display(), kinds = table.len(), "Vehicle data loaded");
        Ok(table)
    }

    fn write_state(&mut self, table: &StatsTable) -> Result<()> {
        let json = serde_json::to_string_pretty(table)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StatsError::PersistenceWrite {
                path: self.path.clone(),
                source,
            })?;
        }

        // Write then rename so a crash never leaves a half-written file
        let temp = self.temp_path();
        std::fs::write(&temp, json)
            .and_then(|_| std::fs::rename(&temp, &self.path))
            .map_err(|source| StatsError::PersistenceWrite { path: self.path.clone(), source })?;

        debug!(path = %self.path.display(), kinds = table.len(), "Vehicle data saved");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory store with write accounting and failure injection.
/// Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StatsTable>>,
    writes: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a previously persisted table
    pub fn with_state(table: StatsTable) -> Self {
        let store = Self::default();
        *store.state.lock() = table;
        store
    }

    /// Number of successful writes
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Last table written
    pub fn snapshot(&self) -> StatsTable {
        self.state.lock().clone()
    }

    /// Make subsequent writes fail until switched off
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl StateStore for MemoryStore {
    fn read_state(&self) -> Result<StatsTable> {
        Ok(self.state.lock().clone())
    }

    fn write_state(&mut self, table: &StatsTable) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StatsError::PersistenceWrite {
                path: PathBuf::from(self.location()),
                source: std::io::Error::new(std::io::ErrorKind::Other, "injected write failure"),
            });
        }
        *self.state.lock() = table.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }
}
