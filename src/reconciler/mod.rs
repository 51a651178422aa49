//! Response reconciliation.
//!
//! The [`Reconciler`] owns everything a detection response changes: the
//! current PPE status and detections, the derived compliance view, the
//! detection history and the alert throttle. Nothing else mutates them.

use chrono::Local;
use serde::Serialize;
use tokio::time::Instant;

use crate::alert::{AlertKind, AlertSettings, AlertThrottle, Tone};
use crate::history::{DetectionHistoryRecord, HistoryLog, Outcome};
use crate::ppe::{ComplianceSnapshot, Detection, PpeStatus, RequiredPpe};
use crate::protocol::DetectionResponse;

/// An alert that fired for a non-compliant result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertFired {
    pub kind: AlertKind,
    /// Banner labels of the missing items
    pub missing: Vec<String>,
    /// Tone played, `None` for visual-only alerts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<Tone>,
}

/// What a response did to the monitor state.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Payload lacked `ppe_status`; prior state left untouched.
    Rejected(String),
    /// No subject in frame; state cleared, nothing recorded.
    NoPerson,
    /// State replaced and one history record appended.
    Recorded {
        record: DetectionHistoryRecord,
        compliance: ComplianceSnapshot,
        alert: Option<AlertFired>,
    },
}

/// Owner of compliance state, history and alerting.
#[derive(Debug)]
pub struct Reconciler {
    status: PpeStatus,
    detections: Vec<Detection>,
    has_detection: bool,
    required: RequiredPpe,
    alerts: AlertSettings,
    compliance: ComplianceSnapshot,
    history: HistoryLog,
    throttle: AlertThrottle,
}

impl Reconciler {
    pub fn new(
        required: RequiredPpe,
        alerts: AlertSettings,
        history: HistoryLog,
        throttle: AlertThrottle,
    ) -> Self {
        let status = PpeStatus::none();
        let compliance = ComplianceSnapshot::evaluate(&required, &status, false);
        Self {
            status,
            detections: Vec::new(),
            has_detection: false,
            required,
            alerts,
            compliance,
            history,
            throttle,
        }
    }

    /// Apply one detection response received at `now`.
    pub fn on_response(&mut self, now: Instant, response: &DetectionResponse) -> ReconcileOutcome {
        let Some(status) = response.ppe_status else {
            let reason = response
                .error
                .clone()
                .unwrap_or_else(|| "response has no ppe_status".to_string());
            tracing::warn!(reason = %reason, "Invalid detection response, cycle aborted");
            return ReconcileOutcome::Rejected(reason);
        };

        if !response.has_person() {
            tracing::debug!("No person in frame, clearing detection state");
            self.status = PpeStatus::none();
            self.detections.clear();
            self.has_detection = false;
            self.recompute();
            return ReconcileOutcome::NoPerson;
        }

        self.status = status;
        self.detections = response.detections.clone();
        self.has_detection = true;
        self.recompute();

        if let Some(reported) = response.is_compliant {
            if reported != self.compliance.is_compliant {
                tracing::debug!(
                    backend = reported,
                    local = self.compliance.is_compliant,
                    "Backend compliance differs from configured requirements"
                );
            }
        }

        let record = DetectionHistoryRecord::new(&self.compliance, Local::now());
        self.history.append(record.clone());

        let outcome = Outcome::from_compliance(self.compliance.is_compliant);
        metrics::counter!("ppe_compliance_records_total", "outcome" => outcome.as_str())
            .increment(1);

        let alert = if self.compliance.is_compliant {
            self.throttle.reset();
            None
        } else {
            self.raise_alert(now)
        };

        ReconcileOutcome::Recorded {
            record,
            compliance: self.compliance.clone(),
            alert,
        }
    }

    fn raise_alert(&mut self, now: Instant) -> Option<AlertFired> {
        let fired = self.throttle.trigger(
            now,
            self.alerts.kind,
            self.alerts.volume,
            self.alerts.repeat_interval(),
        );
        if !fired {
            return None;
        }

        metrics::counter!("ppe_alerts_total").increment(1);
        let missing = self.compliance.banner_labels();
        tracing::info!(missing = %missing.join(", "), kind = ?self.alerts.kind, "PPE alert");
        Some(AlertFired {
            kind: self.alerts.kind,
            missing,
            tone: self.throttle.last_tone().cloned(),
        })
    }

    /// Replace the required set, alert behaviour and history cap.
    ///
    /// Compliance is recomputed immediately; returns the new view.
    pub fn apply_settings(
        &mut self,
        required: RequiredPpe,
        alerts: AlertSettings,
        max_records: usize,
    ) -> ComplianceSnapshot {
        self.required = required;
        self.alerts = alerts;
        self.history.set_max_records(max_records);
        self.recompute();
        self.compliance.clone()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Persist history changes made since the last call.
    pub async fn flush_history(&mut self) {
        self.history.flush().await;
    }

    fn recompute(&mut self) {
        self.compliance =
            ComplianceSnapshot::evaluate(&self.required, &self.status, self.has_detection);
    }

    pub fn status(&self) -> &PpeStatus {
        &self.status
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn has_detection(&self) -> bool {
        self.has_detection
    }

    pub fn compliance(&self) -> &ComplianceSnapshot {
        &self.compliance
    }

    pub fn required(&self) -> &RequiredPpe {
        &self.required
    }

    pub fn alert_settings(&self) -> &AlertSettings {
        &self.alerts
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }
}
