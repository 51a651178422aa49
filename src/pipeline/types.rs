//! Pipeline status and live update types.

use serde::Serialize;

use crate::capture::SizeAdvisory;
use crate::connection::ConnectionState;
use crate::history::DetectionHistoryRecord;
use crate::ppe::{Detection, PpeStatus};
use crate::reconciler::AlertFired;

/// Point-in-time view of the whole pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSnapshot {
    pub connection: ConnectionState,
    /// Detection loop running
    pub active: bool,
    /// A request is awaiting its response
    pub detecting: bool,
    pub interval_ms: u64,
    /// Time until the next loop step, when one is armed
    pub next_step_in_ms: Option<u64>,
    /// Recent round-trip latencies, oldest first
    pub latency_samples: Vec<u64>,
    pub capture_source: String,
    pub ppe_status: PpeStatus,
    pub detections: Vec<Detection>,
    pub has_detection: bool,
    pub is_compliant: bool,
    /// Banner labels of required items not present
    pub missing: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<SizeAdvisory>,
    pub history_len: usize,
}

/// Live update pushed to dashboard clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PipelineUpdate {
    /// Connection, scheduling or compliance state changed
    Status(Box<PipelineSnapshot>),
    /// A history record was appended
    Detection(Box<DetectionHistoryRecord>),
    /// An alert fired
    Alert(AlertFired),
    /// History was cleared by the operator
    HistoryCleared,
}
