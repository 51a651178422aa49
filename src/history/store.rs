//! Durable storage for detection history.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::DetectionHistoryRecord;

/// Errors reading or writing persisted history.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid history file: {0}")]
    Format(String),
}

/// Persists the full record list, newest first.
pub trait HistoryStore: Send + Sync {
    fn load(&self) -> Result<Vec<DetectionHistoryRecord>, HistoryError>;
    fn save(&self, records: &[DetectionHistoryRecord]) -> Result<(), HistoryError>;
}

/// JSON array on disk, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for JsonFileStore {
    fn load(&self) -> Result<Vec<DetectionHistoryRecord>, HistoryError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| HistoryError::Format(e.to_string()))
    }

    fn save(&self, records: &[DetectionHistoryRecord]) -> Result<(), HistoryError> {
        Ok(write_json_atomic(&self.path, records)?)
    }
}

/// In-memory store, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<Vec<DetectionHistoryRecord>>>,
    saves: Arc<Mutex<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<DetectionHistoryRecord>) -> Self {
        let store = Self::default();
        if let Ok(mut guard) = store.records.lock() {
            *guard = records;
        }
        store
    }

    /// Snapshot of the stored records.
    pub fn records(&self) -> Vec<DetectionHistoryRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of saves performed.
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|s| *s).unwrap_or_default()
    }
}

impl HistoryStore for MemoryStore {
    fn load(&self) -> Result<Vec<DetectionHistoryRecord>, HistoryError> {
        Ok(self.records())
    }

    fn save(&self, records: &[DetectionHistoryRecord]) -> Result<(), HistoryError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| HistoryError::Format(e.to_string()))?;
        *guard = records.to_vec();
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }
}

/// Write `value` as pretty JSON next to `path`, then rename over it.
pub(crate) fn write_json_atomic<T: serde::Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
