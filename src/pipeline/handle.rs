//! Client side of the pipeline actor.

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::{PipelineSnapshot, PipelineUpdate};
use crate::history::DetectionHistoryRecord;
use crate::scheduler::StartError;
use crate::settings::{SettingsError, UserSettings};

/// Errors returned through a [`PipelineHandle`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Start(#[from] StartError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("detection pipeline is not running")]
    Stopped,
}

type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
pub(crate) enum Command {
    Start(Reply<Result<(), StartError>>),
    Stop(Reply<()>),
    Snapshot(Reply<PipelineSnapshot>),
    History(Reply<Vec<DetectionHistoryRecord>>),
    ClearHistory(Reply<()>),
    Settings(Reply<UserSettings>),
    UpdateSettings(Value, Reply<Result<UserSettings, SettingsError>>),
}

/// Cloneable handle used by the dashboard and CLI to drive the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    commands: mpsc::Sender<Command>,
    updates: broadcast::Sender<PipelineUpdate>,
}

impl PipelineHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        updates: broadcast::Sender<PipelineUpdate>,
    ) -> Self {
        Self { commands, updates }
    }

    /// Start detecting. Fails if the camera or the backend is not ready.
    pub async fn start(&self) -> Result<(), PipelineError> {
        Ok(self.request(Command::Start).await??)
    }

    pub async fn stop(&self) -> Result<(), PipelineError> {
        self.request(Command::Stop).await
    }

    pub async fn snapshot(&self) -> Result<PipelineSnapshot, PipelineError> {
        self.request(Command::Snapshot).await
    }

    /// History records, newest first.
    pub async fn history(&self) -> Result<Vec<DetectionHistoryRecord>, PipelineError> {
        self.request(Command::History).await
    }

    /// Delete every history record. Irreversible.
    pub async fn clear_history(&self) -> Result<(), PipelineError> {
        self.request(Command::ClearHistory).await
    }

    pub async fn settings(&self) -> Result<UserSettings, PipelineError> {
        self.request(Command::Settings).await
    }

    /// Merge a partial settings object, persist it and apply it live.
    pub async fn update_settings(&self, patch: Value) -> Result<UserSettings, PipelineError> {
        Ok(self
            .request(|reply| Command::UpdateSettings(patch, reply))
            .await??)
    }

    /// Receive live updates.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineUpdate> {
        self.updates.subscribe()
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, PipelineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| PipelineError::Stopped)?;
        rx.await.map_err(|_| PipelineError::Stopped)
    }
}
