//! Output formatting helpers for CLI commands

use crate::history::{DetectionHistoryRecord, Outcome};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde_json::json;

/// Format history records as a table
pub fn format_history_table(records: &[DetectionHistoryRecord]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Fecha", "Hora", "Estado", "Faltantes"]);

    for record in records {
        let outcome = match record.outcome {
            Outcome::Completo => record.outcome.as_str().green().to_string(),
            Outcome::Incompleto => record.outcome.as_str().red().to_string(),
        };
        let missing = if record.missing.is_empty() {
            "-".to_string()
        } else {
            record.missing.clone()
        };

        table.add_row(vec![
            Cell::new(&record.date),
            Cell::new(&record.time),
            Cell::new(outcome),
            Cell::new(missing),
        ]);
    }

    table.to_string()
}

/// Format history records as JSON
pub fn format_history_json(
    records: &[DetectionHistoryRecord],
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&json!({
        "total": records.len(),
        "records": records,
    }))
}

/// One-line summary printed under the table
pub fn format_history_summary(records: &[DetectionHistoryRecord]) -> String {
    let incomplete = records
        .iter()
        .filter(|r| r.outcome == Outcome::Incompleto)
        .count();
    format!(
        "{} record(s), {} complete, {} incomplete",
        records.len(),
        records.len() - incomplete,
        incomplete
    )
}
