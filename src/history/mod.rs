//! Detection history.
//!
//! One record per reconciled detection, newest first, capped at
//! `maxRecords`. The full list is persisted after every change, on the
//! blocking pool.

mod store;

pub use store::{HistoryError, HistoryStore, JsonFileStore, MemoryStore};

pub(crate) use store::write_json_atomic;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::ppe::ComplianceSnapshot;

/// Storage key (file stem) of the persisted history.
pub const HISTORY_STORAGE_KEY: &str = "epp-detection-history";

/// Records kept when nothing else is configured.
pub const DEFAULT_MAX_RECORDS: usize = 20;

/// History retention settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    #[serde(rename = "maxRecords", alias = "max_records")]
    pub max_records: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
        }
    }
}

/// Compliance outcome of one detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Every required item present
    #[serde(alias = "complete")]
    Completo,
    /// At least one required item missing
    #[serde(alias = "incomplete")]
    Incompleto,
}

impl Outcome {
    pub fn from_compliance(is_compliant: bool) -> Self {
        if is_compliant {
            Outcome::Completo
        } else {
            Outcome::Incompleto
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Completo => "Completo",
            Outcome::Incompleto => "Incompleto",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted detection result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionHistoryRecord {
    pub id: String,
    #[serde(rename = "fecha", alias = "date")]
    pub date: String,
    #[serde(rename = "hora", alias = "time")]
    pub time: String,
    #[serde(rename = "estado", alias = "outcome")]
    pub outcome: Outcome,
    /// Missing item labels joined with ", "; empty when complete
    #[serde(rename = "faltantes", alias = "missing", default)]
    pub missing: String,
}

impl DetectionHistoryRecord {
    /// Record a compliance evaluation taken at `at`.
    pub fn new(compliance: &ComplianceSnapshot, at: DateTime<Local>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date: at.format("%-d/%-m/%Y").to_string(),
            time: at.format("%H:%M:%S").to_string(),
            outcome: Outcome::from_compliance(compliance.is_compliant),
            missing: compliance.history_labels(),
        }
    }
}

/// Capped, newest-first record list.
#[derive(Debug, Clone)]
pub struct DetectionHistory {
    records: VecDeque<DetectionHistoryRecord>,
    max_records: usize,
}

impl DetectionHistory {
    pub fn new(max_records: usize) -> Self {
        let max_records = max_records.max(1);
        Self {
            records: VecDeque::with_capacity(max_records),
            max_records,
        }
    }

    /// Start from previously persisted records (newest first), truncated.
    pub fn from_records(records: Vec<DetectionHistoryRecord>, max_records: usize) -> Self {
        let mut history = Self::new(max_records);
        history.records = records.into_iter().take(history.max_records).collect();
        history
    }

    /// Insert at the front, evicting the oldest entries beyond the cap.
    pub fn push(&mut self, record: DetectionHistoryRecord) {
        self.records.push_front(record);
        self.records.truncate(self.max_records);
    }

    /// Change the cap. Returns true if records were evicted.
    pub fn set_max_records(&mut self, max_records: usize) -> bool {
        self.max_records = max_records.max(1);
        let before = self.records.len();
        self.records.truncate(self.max_records);
        self.records.len() != before
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Records, newest first.
    pub fn records(&self) -> Vec<DetectionHistoryRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&DetectionHistoryRecord> {
        self.records.front()
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// History backed by a store.
///
/// Changes mark the log dirty; [`HistoryLog::flush`] writes the full list.
/// Persistence failures are logged and never interrupt detection.
pub struct HistoryLog {
    history: DetectionHistory,
    store: Arc<dyn HistoryStore>,
    dirty: bool,
}

impl HistoryLog {
    /// Load persisted records. An unreadable store starts empty.
    pub fn open(store: Box<dyn HistoryStore>, max_records: usize) -> Self {
        let records = match store.load() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load detection history, starting empty");
                Vec::new()
            }
        };
        let loaded = records.len();
        let history = DetectionHistory::from_records(records, max_records);
        if loaded > 0 {
            tracing::info!(
                records = history.len(),
                max_records = history.max_records(),
                "Detection history loaded"
            );
        }
        Self {
            history,
            store: Arc::from(store),
            dirty: false,
        }
    }

    pub fn append(&mut self, record: DetectionHistoryRecord) {
        self.history.push(record);
        self.dirty = true;
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.dirty = true;
        tracing::info!("Detection history cleared");
    }

    pub fn set_max_records(&mut self, max_records: usize) {
        if self.history.set_max_records(max_records) {
            self.dirty = true;
        }
    }

    pub fn history(&self) -> &DetectionHistory {
        &self.history
    }

    pub fn records(&self) -> Vec<DetectionHistoryRecord> {
        self.history.records()
    }

    /// Unsaved changes since the last flush.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the current records if anything changed. The store runs on the
    /// blocking pool; callers awaiting in turn keep writes ordered.
    pub async fn flush(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;

        let records = self.history.records();
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.save(&records)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to persist detection history"),
            Err(e) => tracing::warn!(error = %e, "History write task failed"),
        }
    }
}

impl fmt::Debug for HistoryLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryLog")
            .field("history", &self.history)
            .field("dirty", &self.dirty)
            .finish()
    }
}
