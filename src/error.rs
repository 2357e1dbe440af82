//! Error types with fix suggestions (v0.1)

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
/// Some variants are only constructed in library code/tests.
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data source error: {0}")]
    Source(String),

    #[error("Handler error: {0}")]
    Handler(String),

    // ─────────────────────────────────────────────────────────────
    // Zone lifecycle errors (SCOUT-010 to SCOUT-014)
    // ─────────────────────────────────────────────────────────────

    #[error("SCOUT-010: Zone '{zone_id}' cannot transition {from} -> {to}")]
    InvalidTransition {
        zone_id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("SCOUT-011: Zone '{zone_id}' is destroyed")]
    ZoneDestroyed { zone_id: String },

    #[error("SCOUT-012: Zone '{zone_id}' not found in dashboard")]
    ZoneNotFound { zone_id: String },

    #[error("SCOUT-013: Zone id '{zone_id}' already exists")]
    DuplicateZone { zone_id: String },

    #[error("SCOUT-014: Zone '{zone_id}' lacks the '{capability}' capability")]
    MissingCapability {
        zone_id: String,
        capability: &'static str,
    },

    // ─────────────────────────────────────────────────────────────
    // Configuration and export errors (SCOUT-020 to SCOUT-022)
    // ─────────────────────────────────────────────────────────────

    #[error("SCOUT-020: Invalid configuration for zone '{zone_id}': {details}")]
    InvalidConfig { zone_id: String, details: String },

    #[error("SCOUT-021: Zone '{zone_id}' has no data to export")]
    NoData { zone_id: String },

    #[error("SCOUT-022: Unsupported export format '{format}'")]
    UnsupportedFormat { format: String },

    // ─────────────────────────────────────────────────────────────
    // Parameter and filter errors (SCOUT-030 to SCOUT-032)
    // ─────────────────────────────────────────────────────────────

    #[error("SCOUT-030: Unknown parameter '{name}'")]
    UnknownParameter { name: String },

    #[error("SCOUT-031: Value '{value}' is not in the allow-list for parameter '{name}'")]
    ValueNotAllowed { name: String, value: String },

    #[error("SCOUT-032: Filter on '{field}' cannot be applied with a null value")]
    FilterValueMissing { field: String },

    // ─────────────────────────────────────────────────────────────
    // Source and replay errors (SCOUT-040 to SCOUT-043)
    // ─────────────────────────────────────────────────────────────

    #[error("SCOUT-040: Unknown data source '{name}'. Available: mock, http")]
    UnknownSource { name: String },

    #[error("SCOUT-041: Invalid source URL '{url}': {details}")]
    InvalidUrl { url: String, details: String },

    #[error("SCOUT-042: Replay speed must be positive, got {speed}")]
    ReplaySpeed { speed: f64 },

    #[error("SCOUT-043: Invalid dashboard definition: {details}")]
    InvalidDefinition { details: String },
}

impl FixSuggestion for ScoutError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            ScoutError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            ScoutError::JsonParse(_) => Some("Check the file contains valid JSON"),
            ScoutError::Io(_) => Some("Check file path and permissions"),
            ScoutError::Source(_) => Some("Check the data source is reachable"),
            ScoutError::Handler(_) => None,

            ScoutError::InvalidTransition { .. } => {
                Some("Call init() before mark_ready(); destroyed zones accept no transitions")
            }
            ScoutError::ZoneDestroyed { .. } => {
                Some("Re-create the zone; destroyed zones reject all operations")
            }
            ScoutError::ZoneNotFound { .. } => Some("Verify the zone id exists on the dashboard"),
            ScoutError::DuplicateZone { .. } => Some("Use a unique zone id per dashboard"),
            ScoutError::MissingCapability { .. } => {
                Some("Declare the capability in the zone's capability flags")
            }

            ScoutError::InvalidConfig { .. } => {
                Some("Only known config keys are accepted; check spelling and value types")
            }
            ScoutError::NoData { .. } => Some("Call refresh_data() before exporting"),
            ScoutError::UnsupportedFormat { .. } => Some("Supported formats: csv, json"),

            ScoutError::UnknownParameter { .. } => {
                Some("Declare the parameter on the dashboard before setting it")
            }
            ScoutError::ValueNotAllowed { .. } => {
                Some("Pick a value from the parameter's allow-list")
            }
            ScoutError::FilterValueMissing { .. } => {
                Some("Set a non-null filter value before applying")
            }

            ScoutError::UnknownSource { .. } => Some("Use --source mock or --source http"),
            ScoutError::InvalidUrl { .. } => {
                Some("Use an absolute http(s) URL without credentials")
            }
            ScoutError::ReplaySpeed { .. } => Some("Use --speed with a value > 0, e.g. 2.0"),
            ScoutError::InvalidDefinition { .. } => {
                Some("Check the schema tag is 'scout/dashboard@0.1' and zone ids are unique")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_render_in_message() {
        let err = ScoutError::ZoneDestroyed {
            zone_id: "kpi-1".to_string(),
        };
        assert!(err.to_string().contains("SCOUT-011"));
        assert!(err.to_string().contains("kpi-1"));
    }

    #[test]
    fn fix_suggestions_present_for_domain_errors() {
        let err = ScoutError::NoData {
            zone_id: "chart-1".to_string(),
        };
        assert!(err.fix_suggestion().unwrap().contains("refresh_data"));

        let err = ScoutError::ReplaySpeed { speed: 0.0 };
        assert!(err.fix_suggestion().is_some());
    }

    #[test]
    fn transition_error_names_both_states() {
        let err = ScoutError::InvalidTransition {
            zone_id: "z1".to_string(),
            from: "created",
            to: "ready",
        };
        let msg = err.to_string();
        assert!(msg.contains("created"));
        assert!(msg.contains("ready"));
    }
}
