//! Payload export: CSV and JSON renderers
//!
//! CSV flattens each row's first-level keys into columns; nested arrays
//! and objects become compact JSON strings inside the cell rather than
//! extra columns.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::ScoutError;
use crate::source::DataPayload;

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(ScoutError::UnsupportedFormat {
                format: other.to_string(),
            }),
        }
    }
}

/// Render a payload in the requested format
pub fn render(payload: &DataPayload, format: ExportFormat) -> Result<String, ScoutError> {
    match format {
        ExportFormat::Csv => Ok(to_csv(payload)),
        ExportFormat::Json => to_json(payload),
    }
}

/// Pretty-printed JSON array of the row objects
pub fn to_json(payload: &DataPayload) -> Result<String, ScoutError> {
    Ok(serde_json::to_string_pretty(&payload.rows)?)
}

/// CSV with a header row from the payload's column schema.
///
/// Rows may omit keys (empty cell) or carry keys the first row did not
/// have (dropped): the schema inferred at fetch time is authoritative.
pub fn to_csv(payload: &DataPayload) -> String {
    let columns: Vec<&str> = payload.columns.iter().map(|c| c.name.as_str()).collect();
    let mut out = String::new();

    out.push_str(
        &columns
            .iter()
            .map(|c| escape_csv(c))
            .collect::<Vec<_>>()
            .join(","),
    );
    out.push('\n');

    for row in &payload.rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|col| {
                row.get(col)
                    .map(|v| escape_csv(&cell_text(v)))
                    .unwrap_or_default()
            })
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

/// Scalar values render bare; nested structures render as compact JSON
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn escape_csv(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
