//! Mock data source for testing
//!
//! Returns configurable rows without touching the network. Essential for
//! unit tests, CI and the `scout run --source mock` path.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{DataPayload, DataRequest, DataSource};
use crate::error::ScoutError;

/// Mock source with per-zone canned rows and failure injection
pub struct MockSource {
    /// Rows returned for zones without an override
    default_rows: Vec<Value>,
    /// Per-zone row overrides
    overrides: DashMap<String, Vec<Value>>,
    /// Zones whose next fetch should fail, with the error text
    failures: DashMap<String, String>,
    /// Simulated fetch latency
    latency: Option<Duration>,
    /// All requests made (for assertions)
    requests: Mutex<Vec<DataRequest>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            default_rows: vec![
                json!({"label": "alpha", "value": 42}),
                json!({"label": "beta", "value": 7}),
            ],
            overrides: DashMap::new(),
            failures: DashMap::new(),
            latency: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replace the default rows
    pub fn with_rows(mut self, rows: Vec<Value>) -> Self {
        self.default_rows = rows;
        self
    }

    /// Simulate network latency on every fetch
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Canned rows for one specific zone
    pub fn set_rows(&self, zone_id: impl Into<String>, rows: Vec<Value>) {
        self.overrides.insert(zone_id.into(), rows);
    }

    /// Make every fetch for `zone_id` fail until cleared
    pub fn fail_with(&self, zone_id: impl Into<String>, error: impl Into<String>) {
        self.failures.insert(zone_id.into(), error.into());
    }

    /// Clear a failure injection
    pub fn clear_failure(&self, zone_id: &str) {
        self.failures.remove(zone_id);
    }

    /// All requests made to this source
    pub fn requests(&self) -> Vec<DataRequest> {
        self.requests.lock().clone()
    }

    /// The most recent request
    pub fn last_request(&self) -> Option<DataRequest> {
        self.requests.lock().last().cloned()
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, request: DataRequest) -> Result<DataPayload, ScoutError> {
        self.requests.lock().push(request.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(error) = self.failures.get(&request.zone_id) {
            return Err(ScoutError::Source(error.clone()));
        }

        let rows = self
            .overrides
            .get(&request.zone_id)
            .map(|r| r.clone())
            .unwrap_or_else(|| self.default_rows.clone());

        Ok(DataPayload::from_rows(rows))
    }
}
