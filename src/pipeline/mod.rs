//! The detection pipeline.
//!
//! One task owns the [`Scheduler`], the [`Reconciler`] and the
//! [`CaptureAdapter`], and wires them to the connection manager. It waits on
//! four things only: shutdown, commands from [`PipelineHandle`]s, connection
//! events, and the scheduler's next step. Nothing in the pipeline runs
//! concurrently with anything else in it, so its state needs no locks.

mod handle;
mod types;


pub use handle::{PipelineError, PipelineHandle};
pub use types::{PipelineSnapshot, PipelineUpdate};

use handle::Command;
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::alert::AlertThrottle;
use crate::capture::CaptureAdapter;
use crate::connection::{ConnectionEvent, ConnectionHandle};
use crate::history::HistoryLog;
use crate::protocol::{DetectionRequest, DetectionResponse};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::scheduler::{Scheduler, SchedulerConfig, StartError, StepDecision};
use crate::settings::{SettingsError, UserSettings};

const COMMAND_BUFFER: usize = 64;
const UPDATE_BUFFER: usize = 256;

/// Prefix of the frame payload included in payload logs.
const PAYLOAD_PREVIEW: usize = 64;

/// The pipeline actor.
pub struct Pipeline {
    scheduler: Scheduler,
    reconciler: Reconciler,
    capture: CaptureAdapter,
    connection: ConnectionHandle,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    events_open: bool,
    commands: mpsc::Receiver<Command>,
    updates: broadcast::Sender<PipelineUpdate>,
    settings: UserSettings,
    settings_path: Option<PathBuf>,
    log_payloads: bool,
}

impl Pipeline {
    /// Assemble the pipeline. Reconciler state starts from `settings`.
    pub fn new(
        config: SchedulerConfig,
        settings: UserSettings,
        capture: CaptureAdapter,
        mut history: HistoryLog,
        throttle: AlertThrottle,
        connection: ConnectionHandle,
        events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) -> (Self, PipelineHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (update_tx, _) = broadcast::channel(UPDATE_BUFFER);

        history.set_max_records(settings.history.max_records);
        let reconciler = Reconciler::new(
            settings.required_ppe,
            settings.alerts.clone(),
            history,
            throttle,
        );

        let pipeline = Self {
            scheduler: Scheduler::new(config),
            reconciler,
            capture,
            connection,
            events,
            events_open: true,
            commands: command_rx,
            updates: update_tx.clone(),
            settings,
            settings_path: None,
            log_payloads: false,
        };
        let handle = PipelineHandle::new(command_tx, update_tx);
        (pipeline, handle)
    }

    /// Persist settings changes to this file.
    pub fn with_settings_path(mut self, path: PathBuf) -> Self {
        self.settings_path = Some(path);
        self
    }

    /// Log a preview of every outgoing frame payload at debug level.
    pub fn with_payload_logging(mut self, enabled: bool) -> Self {
        self.log_payloads = enabled;
        self
    }

    /// Start the pipeline task.
    /// Returns a JoinHandle that resolves when the pipeline stops.
    pub fn start(mut self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                source = %self.capture.source_name(),
                interval_ms = self.scheduler.interval().as_millis() as u64,
                "Detection pipeline started"
            );
            // Loading may have truncated to the configured cap
            self.reconciler.flush_history().await;
            self.run(cancel_token).await;
            self.scheduler.stop();
            tracing::info!("Detection pipeline shutting down");
        })
    }

    async fn run(&mut self, cancel_token: CancellationToken) {
        loop {
            let deadline = self.scheduler.next_deadline();
            let step = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            // Events first: a response already delivered is reconciled
            // before a command issued after it is answered.
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => return,
                event = self.events.recv(), if self.events_open => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        tracing::warn!("Connection manager stopped, no further responses");
                        self.events_open = false;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => return,
                },
                _ = step => self.step().await,
            }
        }
    }

    /// One scheduler tick: capture a frame and send it if allowed.
    async fn step(&mut self) {
        let now = Instant::now();
        match self.scheduler.begin_step(now, self.connection.is_connected()) {
            StepDecision::Inactive => {}
            StepDecision::Disconnected => {
                metrics::counter!("ppe_detection_skipped_total", "reason" => "disconnected")
                    .increment(1);
            }
            StepDecision::Busy => {
                metrics::counter!("ppe_detection_skipped_total", "reason" => "in_flight")
                    .increment(1);
            }
            StepDecision::Capture => self.capture_and_send().await,
        }
    }

    async fn capture_and_send(&mut self) {
        let advisory_before = self.capture.advisory().cloned();
        let Some(frame) = self.capture.capture_frame().await else {
            self.scheduler.cancel_in_flight();
            metrics::counter!("ppe_detection_skipped_total", "reason" => "no_frame").increment(1);
            return;
        };

        let request = DetectionRequest::new(frame.data_uri, self.scheduler.confidence());
        if self.log_payloads {
            let preview: String = request.image.chars().take(PAYLOAD_PREVIEW).collect();
            tracing::debug!(
                bytes = frame.bytes,
                width = frame.width,
                height = frame.height,
                quality = frame.quality,
                preview = %preview,
                "Outgoing frame"
            );
        }

        match self.connection.send(&request) {
            Ok(()) => {
                metrics::counter!("ppe_detection_requests_total").increment(1);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not send detection request");
                self.scheduler.cancel_in_flight();
                metrics::counter!("ppe_detection_skipped_total", "reason" => "send_failed")
                    .increment(1);
            }
        }

        if self.capture.advisory() != advisory_before.as_ref() {
            self.publish_status();
        }
    }

    async fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened => {
                tracing::debug!("Detection server connected");
                self.publish_status();
            }
            ConnectionEvent::Message(response) => self.on_response(&response).await,
            ConnectionEvent::Error(error) => {
                tracing::debug!(error = %error, "Connection error");
                self.scheduler.connection_lost();
            }
            ConnectionEvent::Closed { intentional } => {
                tracing::debug!(intentional, "Detection server disconnected");
                self.scheduler.connection_lost();
                self.publish_status();
            }
        }
    }

    async fn on_response(&mut self, response: &DetectionResponse) {
        let now = Instant::now();
        match self.reconciler.on_response(now, response) {
            ReconcileOutcome::Rejected(_) | ReconcileOutcome::NoPerson => {
                self.scheduler.abort(now);
            }
            ReconcileOutcome::Recorded { record, alert, .. } => {
                if let Some(latency) = self.scheduler.complete(now) {
                    metrics::histogram!("ppe_detection_latency_seconds")
                        .record(latency.as_secs_f64());
                    metrics::gauge!("ppe_adaptive_interval_ms")
                        .set(self.scheduler.interval().as_millis() as f64);
                }
                self.publish(PipelineUpdate::Detection(Box::new(record)));
                if let Some(alert) = alert {
                    self.publish(PipelineUpdate::Alert(alert));
                }
                self.reconciler.flush_history().await;
            }
        }
        self.publish_status();
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                let result = self.start_detection().await;
                let _ = reply.send(result);
            }
            Command::Stop(reply) => {
                self.scheduler.stop();
                self.publish_status();
                let _ = reply.send(());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::History(reply) => {
                let _ = reply.send(self.reconciler.history().records());
            }
            Command::ClearHistory(reply) => {
                self.reconciler.clear_history();
                self.reconciler.flush_history().await;
                self.publish(PipelineUpdate::HistoryCleared);
                self.publish_status();
                let _ = reply.send(());
            }
            Command::Settings(reply) => {
                let _ = reply.send(self.settings.clone());
            }
            Command::UpdateSettings(patch, reply) => {
                let result = self.update_settings(patch);
                self.reconciler.flush_history().await;
                if result.is_ok() {
                    self.publish_status();
                }
                let _ = reply.send(result);
            }
        }
    }

    async fn start_detection(&mut self) -> Result<(), StartError> {
        let readiness = self
            .capture
            .readiness()
            .await
            .map_err(|e| e.to_string());
        let result = self.scheduler.start(
            Instant::now(),
            readiness,
            self.connection.is_connected(),
        );
        match &result {
            Ok(()) => self.publish_status(),
            Err(e) => tracing::warn!(error = %e, "Detection not started"),
        }
        result
    }

    fn update_settings(&mut self, patch: serde_json::Value) -> Result<UserSettings, SettingsError> {
        let settings = self.settings.merged(patch)?;
        settings.validate()?;

        if settings.camera != self.settings.camera {
            let capture =
                CaptureAdapter::from_config(&settings.camera).map_err(|e| SettingsError::Invalid {
                    field: "camera".to_string(),
                    message: e.to_string(),
                })?;
            tracing::info!(source = %capture.source_name(), "Capture source changed");
            self.capture = capture;
        }

        if let Some(path) = &self.settings_path {
            settings.save(path)?;
        }

        self.reconciler.apply_settings(
            settings.required_ppe,
            settings.alerts.clone(),
            settings.history.max_records,
        );
        self.settings = settings.clone();
        tracing::info!("Settings updated");
        Ok(settings)
    }

    fn snapshot(&self) -> PipelineSnapshot {
        let now = Instant::now();
        let compliance = self.reconciler.compliance();
        PipelineSnapshot {
            connection: self.connection.state(),
            active: self.scheduler.is_active(),
            detecting: self.scheduler.in_flight(),
            interval_ms: self.scheduler.interval().as_millis() as u64,
            next_step_in_ms: self
                .scheduler
                .next_deadline()
                .map(|at| at.saturating_duration_since(now).as_millis() as u64),
            latency_samples: self.scheduler.latency().samples(),
            capture_source: self.capture.source_name(),
            ppe_status: *self.reconciler.status(),
            detections: self.reconciler.detections().to_vec(),
            has_detection: self.reconciler.has_detection(),
            is_compliant: compliance.is_compliant,
            missing: compliance.banner_labels(),
            advisory: self.capture.advisory().cloned(),
            history_len: self.reconciler.history().history().len(),
        }
    }

    fn publish_status(&self) {
        if self.updates.receiver_count() > 0 {
            self.publish(PipelineUpdate::Status(Box::new(self.snapshot())));
        }
    }

    fn publish(&self, update: PipelineUpdate) {
        // No subscribers is fine
        let _ = self.updates.send(update);
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("scheduler", &self.scheduler)
            .field("capture", &self.capture)
            .finish()
    }
}
