//! Dashboard facade: zones, parameters, filters (v0.1)
//!
//! One entry point over the zone collection, the shared parameter table
//! and the dashboard-level filter list. Zones share the dashboard's bus
//! and data source; the facade guarantees id uniqueness and lifecycle
//! ordering so hosts never drive a zone state machine by hand.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::error::ScoutError;
use crate::event::EventKind;
use crate::source::{value_type_name, DataSource};
use crate::zone::{Zone, ZoneContext, ZoneSpec, ZoneState};

// ============================================================================
// PARAMETERS AND FILTERS
// ============================================================================

/// Shared dashboard parameter. When `allowed` is present, set_parameter
/// rejects any value outside the list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
}

impl Parameter {
    /// Parameter with its type inferred from the initial value
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            data_type: value_type_name(&value),
            value,
            allowed: None,
        }
    }

    pub fn with_allowed(mut self, allowed: Vec<Value>) -> Self {
        self.allowed = Some(allowed);
        self
    }
}

/// Filter definition. `applied` distinguishes declared-but-inactive
/// filters from active ones; clearing deactivates, never deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operator: String,
    pub value: Value,
    #[serde(default)]
    pub applied: bool,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value,
            applied: false,
        }
    }
}

// ============================================================================
// DASHBOARD
// ============================================================================

/// Content facade owning the zone collection
pub struct Dashboard {
    id: String,
    bus: Arc<EventBus>,
    source: Arc<dyn DataSource>,
    /// Insertion-ordered, mirrors the host's layout order
    zones: RwLock<Vec<Arc<Zone>>>,
    parameters: DashMap<String, Parameter>,
    filters: RwLock<Vec<Filter>>,
    refresh_tasks: Mutex<Vec<JoinHandle<()>>>,
    theme: String,
    locale: String,
    user: String,
}

impl Dashboard {
    pub fn new(id: impl Into<String>, bus: Arc<EventBus>, source: Arc<dyn DataSource>) -> Self {
        Self {
            id: id.into(),
            bus,
            source,
            zones: RwLock::new(Vec::new()),
            parameters: DashMap::new(),
            filters: RwLock::new(Vec::new()),
            refresh_tasks: Mutex::new(Vec::new()),
            theme: "light".to_string(),
            locale: "en-US".to_string(),
            user: String::new(),
        }
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = theme.into();
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    /// Announce the assembled dashboard on the bus
    pub fn initialize(&self) -> Result<(), ScoutError> {
        let zone_count = self.zones.read().len();
        info!(dashboard = %self.id, zone_count, "dashboard initialized");
        self.bus.emit(
            EventKind::DashboardInitialized {
                dashboard_id: self.id.clone(),
                zone_count,
            },
            &self.id,
        )?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Zones
    // ─────────────────────────────────────────────────────────────

    /// Create a zone, drive it through created -> initializing -> ready
    /// and register it. Zone ids are unique per dashboard.
    pub fn add_zone(&self, spec: ZoneSpec) -> Result<Arc<Zone>, ScoutError> {
        if self.zone(&spec.id).is_some() {
            return Err(ScoutError::DuplicateZone { zone_id: spec.id });
        }

        let zone = Arc::new(Zone::new(
            spec,
            Arc::clone(&self.bus),
            Arc::clone(&self.source),
        ));
        zone.init(self.zone_context())?;
        zone.mark_ready()?;

        self.zones.write().push(Arc::clone(&zone));
        Ok(zone)
    }

    /// Destroy and unregister one zone
    pub fn remove_zone(&self, zone_id: &str) -> Result<(), ScoutError> {
        let zone = {
            let mut zones = self.zones.write();
            let idx = zones
                .iter()
                .position(|z| z.id() == zone_id)
                .ok_or_else(|| ScoutError::ZoneNotFound {
                    zone_id: zone_id.to_string(),
                })?;
            zones.remove(idx)
        };
        zone.destroy()
    }

    pub fn zone(&self, zone_id: &str) -> Option<Arc<Zone>> {
        self.zones
            .read()
            .iter()
            .find(|z| z.id() == zone_id)
            .cloned()
    }

    /// Zone ids in registration order
    pub fn zone_ids(&self) -> Vec<String> {
        self.zones.read().iter().map(|z| z.id().to_string()).collect()
    }

    pub fn zone_count(&self) -> usize {
        self.zones.read().len()
    }

    /// Snapshot context handed to zones at init time
    fn zone_context(&self) -> ZoneContext {
        ZoneContext {
            dashboard_id: self.id.clone(),
            parameters: self
                .parameters
                .iter()
                .map(|p| (p.key().clone(), p.value().value.clone()))
                .collect(),
            filters: self.filters.read().clone(),
            theme: self.theme.clone(),
            locale: self.locale.clone(),
            user: self.user.clone(),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Parameters
    // ─────────────────────────────────────────────────────────────

    /// Declare a parameter. Declaring is not a change: no event fires.
    pub fn define_parameter(&self, parameter: Parameter) {
        self.parameters.insert(parameter.name.clone(), parameter);
    }

    /// Change a declared parameter, enforcing its allow-list
    pub fn set_parameter(&self, name: &str, value: Value) -> Result<(), ScoutError> {
        let old_value = {
            let mut entry =
                self.parameters
                    .get_mut(name)
                    .ok_or_else(|| ScoutError::UnknownParameter {
                        name: name.to_string(),
                    })?;

            if let Some(allowed) = &entry.allowed {
                if !allowed.contains(&value) {
                    return Err(ScoutError::ValueNotAllowed {
                        name: name.to_string(),
                        value: value.to_string(),
                    });
                }
            }
            std::mem::replace(&mut entry.value, value.clone())
        };

        self.bus.emit(
            EventKind::ParameterChanged {
                name: name.to_string(),
                old_value,
                new_value: value,
            },
            &self.id,
        )?;
        Ok(())
    }

    pub fn parameter(&self, name: &str) -> Option<Parameter> {
        self.parameters.get(name).map(|p| p.clone())
    }

    /// Snapshot of every declared parameter, sorted by name
    pub fn parameters(&self) -> Vec<Parameter> {
        let mut all: Vec<Parameter> = self.parameters.iter().map(|p| p.clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    // ─────────────────────────────────────────────────────────────
    // Filters
    // ─────────────────────────────────────────────────────────────

    /// Activate a filter (upserting its definition). Null values are a
    /// fault: a filter without a value cannot select anything.
    pub fn apply_filter(
        &self,
        field: &str,
        operator: &str,
        value: Value,
    ) -> Result<(), ScoutError> {
        if value.is_null() {
            return Err(ScoutError::FilterValueMissing {
                field: field.to_string(),
            });
        }

        {
            let mut filters = self.filters.write();
            match filters.iter_mut().find(|f| f.field == field) {
                Some(filter) => {
                    filter.operator = operator.to_string();
                    filter.value = value.clone();
                    filter.applied = true;
                }
                None => {
                    let mut filter = Filter::new(field, operator, value.clone());
                    filter.applied = true;
                    filters.push(filter);
                }
            }
        }

        self.bus.emit(
            EventKind::FilterApplied {
                field: field.to_string(),
                operator: operator.to_string(),
                value,
            },
            &self.id,
        )?;
        Ok(())
    }

    /// Deactivate a filter, keeping its definition. Returns false when
    /// no filter on `field` exists.
    pub fn clear_filter(&self, field: &str) -> Result<bool, ScoutError> {
        let cleared = {
            let mut filters = self.filters.write();
            match filters.iter_mut().find(|f| f.field == field) {
                Some(filter) => {
                    filter.applied = false;
                    true
                }
                None => false,
            }
        };

        if cleared {
            self.bus.emit(
                EventKind::FilterCleared {
                    field: field.to_string(),
                },
                &self.id,
            )?;
        }
        Ok(cleared)
    }

    /// Union of dashboard-level and zone-level filters, dashboard first.
    /// Two filters on the same field are both reported; precedence is
    /// the consumer's call.
    pub fn filters(&self) -> Vec<Filter> {
        let mut all = self.filters.read().clone();
        for zone in self.zones.read().iter() {
            all.extend(zone.filters());
        }
        all
    }

    // ─────────────────────────────────────────────────────────────
    // Refresh
    // ─────────────────────────────────────────────────────────────

    /// Refresh every refresh-capable zone concurrently. Returns the
    /// number of zones that refreshed successfully; per-zone failures
    /// surface as data:error events, not as a facade error.
    pub async fn refresh_all(&self) -> usize {
        let zones: Vec<Arc<Zone>> = self
            .zones
            .read()
            .iter()
            .filter(|z| {
                z.capabilities().refresh
                    && matches!(z.state(), ZoneState::Ready | ZoneState::Error)
            })
            .cloned()
            .collect();

        let results = join_all(zones.iter().map(|z| z.refresh_data())).await;
        results.iter().filter(|r| r.is_ok()).count()
    }

    /// Spawn one periodic refresh task per zone that declares a
    /// refreshInterval and carries the refresh capability. Zones with
    /// ai_insights also get an insight:requested after each tick.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_auto_refresh(&self) {
        let mut tasks = self.refresh_tasks.lock();
        for zone in self.zones.read().iter() {
            let Some(interval) = zone.config().refresh_interval() else {
                continue;
            };
            if !zone.capabilities().refresh {
                continue;
            }

            let zone = Arc::clone(zone);
            let bus = Arc::clone(&self.bus);
            debug!(zone = %zone.id(), ?interval, "auto-refresh scheduled");
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                // First tick completes immediately; skip it so the period
                // starts after scheduling.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    match zone.load_data(true).await {
                        Ok(_) if zone.capabilities().ai_insights => {
                            if let Err(err) = bus.emit(
                                EventKind::InsightRequested {
                                    zone_id: zone.id().to_string(),
                                },
                                "auto-refresh",
                            ) {
                                warn!(zone = %zone.id(), error = %err, "insight request failed");
                            }
                        }
                        Ok(_) => {}
                        Err(ScoutError::ZoneDestroyed { .. }) => break,
                        Err(err) => {
                            // data:error already emitted by the zone
                            debug!(zone = %zone.id(), error = %err, "auto-refresh tick failed");
                        }
                    }
                }
            }));
        }
    }

    /// Abort all periodic refresh tasks
    pub fn stop_auto_refresh(&self) {
        for task in self.refresh_tasks.lock().drain(..) {
            task.abort();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Teardown
    // ─────────────────────────────────────────────────────────────

    /// Stop auto-refresh, destroy every zone and announce destruction.
    /// Idempotent: a second call finds no zones and emits again harmlessly.
    pub fn teardown(&self) -> Result<(), ScoutError> {
        self.stop_auto_refresh();

        let zones: Vec<Arc<Zone>> = self.zones.write().drain(..).collect();
        for zone in zones {
            zone.destroy()?;
        }

        self.bus.emit(
            EventKind::DashboardDestroyed {
                dashboard_id: self.id.clone(),
            },
            &self.id,
        )?;
        Ok(())
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        // Periodic tasks hold Arc<Zone>; abort them so a dropped
        // dashboard does not keep refreshing in the background.
        self.stop_auto_refresh();
    }
}

impl std::fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dashboard")
            .field("id", &self.id)
            .field("zones", &self.zone_ids())
            .finish()
    }
}
