//! History command implementation
//!
//! Reads the history file directly, so it works whether or not a monitor
//! is running. A running monitor keeps its own copy in memory and rewrites
//! the file on its next detection; clear through the dashboard
//! (`DELETE /api/history`) in that case.

use crate::cli::output::{format_history_json, format_history_summary, format_history_table};
use crate::cli::{HistoryClearArgs, HistoryListArgs};
use crate::config::{MonitorConfig, StorageConfig};
use crate::history::{HistoryStore, JsonFileStore, Outcome};
use std::path::{Path, PathBuf};

/// Storage location from config file, environment and `--data-dir`.
pub fn resolve_storage(
    config_path: &Path,
    data_dir: Option<&PathBuf>,
) -> Result<StorageConfig, Box<dyn std::error::Error>> {
    let config = if config_path.exists() {
        MonitorConfig::load(Some(config_path))?
    } else {
        MonitorConfig::default()
    };
    let mut storage = config.with_env_overrides().storage;
    if let Some(dir) = data_dir {
        storage.data_dir = dir.clone();
    }
    Ok(storage)
}

/// Handle `ppe-monitor history list`
pub fn handle_history_list(args: &HistoryListArgs) -> Result<String, Box<dyn std::error::Error>> {
    let storage = resolve_storage(&args.config, args.data_dir.as_ref())?;
    let store = JsonFileStore::new(storage.history_path());

    let mut records = store.load()?;
    if args.incomplete {
        records.retain(|r| r.outcome == Outcome::Incompleto);
    }
    if let Some(limit) = args.limit {
        records.truncate(limit);
    }

    if args.json {
        return Ok(format_history_json(&records)?);
    }

    if records.is_empty() {
        return Ok(format!(
            "No detections recorded in {}",
            store.path().display()
        ));
    }

    Ok(format!(
        "{}\n{}",
        format_history_table(&records),
        format_history_summary(&records)
    ))
}

/// Handle `ppe-monitor history clear`
pub fn handle_history_clear(
    args: &HistoryClearArgs,
) -> Result<String, Box<dyn std::error::Error>> {
    if !args.yes {
        return Err("Clearing history cannot be undone. Re-run with --yes to confirm.".into());
    }

    let storage = resolve_storage(&args.config, args.data_dir.as_ref())?;
    let store = JsonFileStore::new(storage.history_path());
    let removed = store.load().map(|r| r.len()).unwrap_or(0);
    store.save(&[])?;

    tracing::info!(path = %store.path().display(), removed, "History cleared");
    Ok(format!("✓ Removed {} record(s)", removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::DetectionHistoryRecord;

    fn seed(dir: &Path) -> JsonFileStore {
        let store = JsonFileStore::new(dir.join("epp-detection-history.json"));
        let records: Vec<DetectionHistoryRecord> = (0..4)
            .map(|i| DetectionHistoryRecord {
                id: format!("r{}", i),
                date: "3/7/2026".to_string(),
                time: format!("08:15:0{}", i),
                outcome: if i % 2 == 0 {
                    Outcome::Incompleto
                } else {
                    Outcome::Completo
                },
                missing: if i % 2 == 0 {
                    "Casco".to_string()
                } else {
                    String::new()
                },
            })
            .collect();
        store.save(&records).unwrap();
        store
    }

    fn list_args(dir: &Path) -> HistoryListArgs {
        HistoryListArgs {
            json: true,
            limit: None,
            incomplete: false,
            config: dir.join("missing.toml"),
            data_dir: Some(dir.to_path_buf()),
        }
    }

    #[test]
    fn test_list_json_with_limit() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());

        let args = HistoryListArgs {
            limit: Some(3),
            ..list_args(dir.path())
        };
        let output = handle_history_list(&args).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["total"], 3);
        assert_eq!(value["records"][0]["id"], "r0");
    }

    #[test]
    fn test_list_incomplete_only() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());

        let args = HistoryListArgs {
            incomplete: true,
            ..list_args(dir.path())
        };
        let output = handle_history_list(&args).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["total"], 2);
    }

    #[test]
    fn test_list_empty_message() {
        let dir = tempfile::tempdir().unwrap();
        let args = HistoryListArgs {
            json: false,
            ..list_args(dir.path())
        };
        let output = handle_history_list(&args).unwrap();
        assert!(output.starts_with("No detections recorded"));
    }

    #[test]
    fn test_clear_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let store = seed(dir.path());

        let args = HistoryClearArgs {
            yes: false,
            config: dir.path().join("missing.toml"),
            data_dir: Some(dir.path().to_path_buf()),
        };
        assert!(handle_history_clear(&args).is_err());
        assert_eq!(store.load().unwrap().len(), 4);
    }

    #[test]
    fn test_clear_empties_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = seed(dir.path());

        let args = HistoryClearArgs {
            yes: true,
            config: dir.path().join("missing.toml"),
            data_dir: Some(dir.path().to_path_buf()),
        };
        let message = handle_history_clear(&args).unwrap();
        assert!(message.contains("4"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_resolve_storage_reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("ppe-monitor.toml");
        std::fs::write(&config_path, "[storage]\ndata_dir = \"/var/lib/ppe\"\n").unwrap();

        let storage = resolve_storage(&config_path, None).unwrap();
        if std::env::var("PPE_DATA_DIR").is_err() {
            assert_eq!(storage.data_dir, PathBuf::from("/var/lib/ppe"));
        }

        let storage = resolve_storage(&config_path, Some(&dir.path().to_path_buf())).unwrap();
        assert_eq!(storage.data_dir, dir.path());
    }
}
