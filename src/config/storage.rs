//! Local storage configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where persisted state (detection history, user settings) lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".ppe-monitor"),
        }
    }
}

impl StorageConfig {
    /// File holding the persisted detection history.
    pub fn history_path(&self) -> PathBuf {
        self.data_dir
            .join(format!("{}.json", crate::history::HISTORY_STORAGE_KEY))
    }

    /// File holding the user settings object.
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir
            .join(format!("{}.json", crate::settings::SETTINGS_STORAGE_KEY))
    }
}
