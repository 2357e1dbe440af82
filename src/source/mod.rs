//! # Data Source Abstraction Layer
//!
//! Trait and implementations for zone data backends.
//!
//! The source module defines how zones fetch their data:
//!
//! - [`DataSource`] - Core trait for fetching zone payloads
//! - [`MockSource`] - Test source with canned rows and failure injection
//! - [`HttpSource`] - Production source reading JSON rows over HTTP
//!
//! All fetches are async; the zone lifecycle never cares which backend is
//! behind the trait. Use [`create_source`] to instantiate one by name:
//!
//! ```rust
//! use scout::source::create_source;
//!
//! let mock = create_source("mock", None);
//! assert!(mock.is_ok());
//!
//! let unknown = create_source("invalid", None);
//! assert!(unknown.is_err());
//! ```

mod http;
mod mock;

pub use http::HttpSource;
pub use mock::MockSource;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ScoutError;

// ============================================================================
// REQUEST / PAYLOAD TYPES
// ============================================================================

/// Request a zone sends to its data source
#[derive(Debug, Clone)]
pub struct DataRequest {
    /// Requesting zone
    pub zone_id: String,
    /// Zone type discriminator ("kpi", "chart", ...)
    pub zone_type: String,
    /// Optional query from the zone config
    pub query: Option<String>,
    /// Parameter snapshot at request time
    pub parameters: HashMap<String, Value>,
    /// Applied filters at request time, (field, operator, value)
    pub filters: Vec<(String, String, Value)>,
}

impl DataRequest {
    pub fn new(zone_id: impl Into<String>, zone_type: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            zone_type: zone_type.into(),
            query: None,
            parameters: HashMap::new(),
            filters: Vec::new(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// Column schema entry for a fetched payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Fetched payload plus metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPayload {
    /// Row objects (first-level keys are the export columns)
    pub rows: Vec<Value>,
    pub row_count: usize,
    pub columns: Vec<Column>,
    /// Wall-clock fetch time (ms since epoch)
    pub fetched_at_ms: u64,
    pub from_cache: bool,
}

impl DataPayload {
    /// Build a payload from rows, inferring the column schema from the
    /// first row's first-level keys.
    pub fn from_rows(rows: Vec<Value>) -> Self {
        let columns = rows
            .first()
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .map(|(k, v)| Column::new(k.clone(), value_type_name(v)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            row_count: rows.len(),
            columns,
            rows,
            fetched_at_ms: now_ms(),
            from_cache: false,
        }
    }

    pub fn cached(mut self) -> Self {
        self.from_cache = true;
        self
    }
}

pub(crate) fn value_type_name(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ============================================================================
// DATA SOURCE TRAIT (ASYNC)
// ============================================================================

/// Core trait all zone data backends implement
///
/// The zone lifecycle calls `fetch` during `refresh_data()` and treats the
/// returned payload as opaque. Implementations are responsible for
/// honoring the request's parameters and filters.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Source name ("mock", "http", ...)
    fn name(&self) -> &str;

    /// Fetch a payload for one zone
    async fn fetch(&self, request: DataRequest) -> Result<DataPayload, ScoutError>;

    /// Check if this source is usable (e.g. base URL configured)
    fn is_available(&self) -> bool {
        true
    }
}

// ============================================================================
// SOURCE FACTORY
// ============================================================================

/// Create a data source by name
///
/// | Name | Description | Requires |
/// |------|-------------|----------|
/// | `mock` | Canned rows | Nothing |
/// | `http` | JSON rows over HTTP | base URL |
pub fn create_source(
    name: &str,
    base_url: Option<&str>,
) -> Result<Arc<dyn DataSource>, ScoutError> {
    match name.to_lowercase().as_str() {
        "mock" => Ok(Arc::new(MockSource::new())),
        "http" => {
            let base = base_url.ok_or_else(|| ScoutError::InvalidUrl {
                url: String::new(),
                details: "http source requires --base-url".to_string(),
            })?;
            Ok(Arc::new(HttpSource::new(base)?))
        }
        _ => Err(ScoutError::UnknownSource {
            name: name.to_string(),
        }),
    }
}
