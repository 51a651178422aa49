//! User settings object (`epp-config`).
//!
//! Holds the choices an operator edits at runtime: camera selection, the
//! required PPE set, alert behaviour and history retention. The persisted
//! JSON is merged over defaults taken from the process configuration, so a
//! file written by an older build (or edited by hand) only needs the keys it
//! wants to change.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

use crate::alert::AlertSettings;
use crate::capture::CameraConfig;
use crate::config::MonitorConfig;
use crate::history::{write_json_atomic, HistorySettings};
use crate::ppe::RequiredPpe;

/// Storage key (file stem) of the persisted user settings.
pub const SETTINGS_STORAGE_KEY: &str = "epp-config";

/// Errors loading, validating or saving user settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings: {0}")]
    Format(String),

    #[error("invalid setting '{field}': {message}")]
    Invalid { field: String, message: String },
}

/// Operator-editable settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub camera: CameraConfig,
    #[serde(rename = "requiredPPE", alias = "requiredPpe", alias = "required_ppe")]
    pub required_ppe: RequiredPpe,
    pub alerts: AlertSettings,
    pub history: HistorySettings,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

impl UserSettings {
    /// Defaults taken from the process configuration.
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            camera: config.camera.clone(),
            required_ppe: config.required_ppe,
            alerts: config.alerts.clone(),
            history: config.history.clone(),
        }
    }

    /// Load the settings file, merged over `defaults`.
    ///
    /// A missing or empty file yields `defaults` unchanged.
    pub fn load(path: &Path, defaults: &UserSettings) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(defaults.clone());
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(defaults.clone());
        }
        let patch: Value =
            serde_json::from_str(&content).map_err(|e| SettingsError::Format(e.to_string()))?;
        let settings = defaults.merged(patch)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply a partial JSON object on top of these settings.
    pub fn merged(&self, patch: Value) -> Result<Self, SettingsError> {
        if !patch.is_object() {
            return Err(SettingsError::Format(
                "settings must be a JSON object".to_string(),
            ));
        }
        let mut base =
            serde_json::to_value(self).map_err(|e| SettingsError::Format(e.to_string()))?;
        merge_json(&mut base, patch);
        serde_json::from_value(base).map_err(|e| SettingsError::Format(e.to_string()))
    }

    /// Persist atomically.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        write_json_atomic(path, self)?;
        tracing::debug!(path = %path.display(), "User settings saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.camera
            .validate()
            .map_err(|e| SettingsError::Invalid {
                field: "camera".to_string(),
                message: e.to_string(),
            })?;

        if self.alerts.volume > 100 {
            return Err(SettingsError::Invalid {
                field: "alerts.volume".to_string(),
                message: format!("must be between 0 and 100, got {}", self.alerts.volume),
            });
        }

        if self.history.max_records == 0 {
            return Err(SettingsError::Invalid {
                field: "history.maxRecords".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Recursively overlay `patch` onto `base`. Objects merge key by key; any
/// other value replaces the target.
fn merge_json(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertKind;
    use crate::capture::CameraType;
    use serde_json::json;

    #[test]
    fn test_defaults_follow_process_config() {
        let mut config = MonitorConfig::default();
        config.alerts.volume = 30;
        config.history.max_records = 7;

        let settings = UserSettings::from_config(&config);
        assert_eq!(settings.alerts.volume, 30);
        assert_eq!(settings.history.max_records, 7);
        assert_eq!(settings.required_ppe, RequiredPpe::all());
    }

    #[test]
    fn test_serializes_with_camel_case_keys() {
        let json = serde_json::to_value(UserSettings::default()).unwrap();
        assert!(json.get("requiredPPE").is_some());
        assert_eq!(json["requiredPPE"]["casco"], true);
        assert_eq!(json["alerts"]["repeatInterval"], 5);
        assert_eq!(json["history"]["maxRecords"], 20);
        assert_eq!(json["camera"]["type"], "webcam");
    }

    #[test]
    fn test_partial_patch_keeps_other_values() {
        let defaults = UserSettings::default();
        let merged = defaults
            .merged(json!({
                "requiredPPE": { "tapabocas": false },
                "alerts": { "type": "visual" }
            }))
            .unwrap();

        assert!(!merged.required_ppe.face_mask);
        assert!(merged.required_ppe.helmet);
        assert_eq!(merged.alerts.kind, AlertKind::Visual);
        assert_eq!(merged.alerts.volume, 70);
        assert_eq!(merged.history, defaults.history);
    }

    #[test]
    fn test_patch_must_be_object() {
        let result = UserSettings::default().merged(json!([1, 2]));
        assert!(matches!(result, Err(SettingsError::Format(_))));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = UserSettings::default();
        let loaded = UserSettings::load(&dir.path().join("epp-config.json"), &defaults).unwrap();
        assert_eq!(loaded, defaults);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("epp-config.json");

        let mut settings = UserSettings::default();
        settings.camera.camera_type = CameraType::Ip;
        settings.camera.ip_url = "http://10.0.0.5:8080".to_string();
        settings.history.max_records = 50;
        settings.save(&path).unwrap();

        let loaded = UserSettings::load(&path, &UserSettings::default()).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epp-config.json");
        std::fs::write(&path, r#"{"history": {"maxRecords": 0}}"#).unwrap();

        let err = UserSettings::load(&path, &UserSettings::default()).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { ref field, .. } if field == "history.maxRecords"));
    }

    #[test]
    fn test_load_rejects_corrupt_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epp-config.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            UserSettings::load(&path, &UserSettings::default()),
            Err(SettingsError::Format(_))
        ));
    }
}
