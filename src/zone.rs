//! Zone lifecycle state machine (v0.1)
//!
//! A zone is one dashboard widget/panel, driven through
//! `created -> initializing -> ready <-> loading <-> error -> destroyed`.
//! `destroyed` is terminal: every later call faults with SCOUT-011.
//!
//! Data faults follow a graceful-degradation policy: a failed refresh sets
//! `error` and transitions to the error state, but keeps the last good
//! payload so hosts can still render stale data behind an error badge.
//!
//! Every refresh is issued a monotonically increasing ticket; a completion
//! whose ticket is no longer the newest is discarded instead of applied,
//! so an old slow fetch can never overwrite a newer result.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::bus::{EventBus, HandlerId};
use crate::dashboard::Filter;
use crate::error::ScoutError;
use crate::event::EventKind;
use crate::export::{render, ExportFormat};
use crate::source::{DataPayload, DataRequest, DataSource};

// ============================================================================
// LIFECYCLE STATES
// ============================================================================

/// Zone lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneState {
    Created,
    Initializing,
    Ready,
    Loading,
    Error,
    Destroyed,
}

impl ZoneState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Loading => "loading",
            Self::Error => "error",
            Self::Destroyed => "destroyed",
        }
    }

    /// Central transition table. `destroyed` is terminal; `ready`,
    /// `loading` and `error` may cycle.
    pub fn can_transition(self, to: ZoneState) -> bool {
        use ZoneState::*;
        match (self, to) {
            (Destroyed, _) => false,
            (_, Destroyed) => true,
            (Created, Initializing) => true,
            (Initializing, Ready) => true,
            (Ready, Loading) | (Error, Loading) => true,
            (Loading, Ready) | (Loading, Error) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ZoneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CAPABILITIES
// ============================================================================

/// The fixed contract a host UI uses to decide which controls to render
/// for a zone. Declared, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Capabilities {
    pub export: bool,
    pub refresh: bool,
    pub configure: bool,
    pub resize: bool,
    pub ai_insights: bool,
    pub selection: bool,
    pub drill_down: bool,
    pub annotation: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            export: true,
            refresh: true,
            configure: true,
            resize: true,
            ai_insights: true,
            selection: true,
            drill_down: true,
            annotation: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// KPI tiles: refreshable numbers, no interaction surface
    pub fn kpi() -> Self {
        Self {
            export: true,
            refresh: true,
            configure: true,
            ai_insights: true,
            ..Self::default()
        }
    }

    /// Charts: the full interactive surface minus annotation
    pub fn chart() -> Self {
        Self {
            annotation: false,
            ..Self::all()
        }
    }

    /// Filter controls: configuration and layout only
    pub fn filter() -> Self {
        Self {
            configure: true,
            resize: true,
            ..Self::default()
        }
    }

    /// Data tables: exportable, selectable, no insight hooks
    pub fn table() -> Self {
        Self {
            export: true,
            refresh: true,
            configure: true,
            resize: true,
            selection: true,
            ..Self::default()
        }
    }

    /// Default capability set for a zone type discriminator
    pub fn for_zone_type(zone_type: &str) -> Self {
        match zone_type {
            "kpi" => Self::kpi(),
            "chart" => Self::chart(),
            "filter" => Self::filter(),
            "table" => Self::table(),
            _ => Self::none(),
        }
    }
}

// ============================================================================
// CONFIG
// ============================================================================

/// Known config keys and the shape each value must have
const ALLOWED_CONFIG_KEYS: &[&str] = &[
    "title",
    "query",
    "refreshInterval",
    "limit",
    "showLegend",
    "colorScheme",
];

/// Zone configuration: a closed key-value table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneConfig {
    entries: HashMap<String, Value>,
}

impl ZoneConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: HashMap<String, Value>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn title(&self) -> Option<&str> {
        self.entries.get("title").and_then(Value::as_str)
    }

    pub fn query(&self) -> Option<&str> {
        self.entries.get("query").and_then(Value::as_str)
    }

    /// Auto-refresh period, when declared
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.entries
            .get("refreshInterval")
            .and_then(Value::as_u64)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Reject unknown keys and malformed values
    pub fn validate(&self) -> Result<(), String> {
        for (key, value) in &self.entries {
            if !ALLOWED_CONFIG_KEYS.contains(&key.as_str()) {
                return Err(format!("unknown key '{key}'"));
            }
            let ok = match key.as_str() {
                "title" | "query" | "colorScheme" => value.is_string(),
                "refreshInterval" | "limit" => value.as_u64().is_some_and(|n| n > 0),
                "showLegend" => value.is_boolean(),
                _ => unreachable!("key membership checked above"),
            };
            if !ok {
                return Err(format!("invalid value for '{key}': {value}"));
            }
        }
        Ok(())
    }

    /// Merge `partial` over this config, returning the merged result
    /// without touching `self`.
    pub fn merged_with(&self, partial: &HashMap<String, Value>) -> Self {
        let mut entries = self.entries.clone();
        for (key, value) in partial {
            entries.insert(key.clone(), value.clone());
        }
        Self { entries }
    }
}

// ============================================================================
// CONTEXT
// ============================================================================

/// Context bound to a zone at init time
#[derive(Debug, Clone, Default)]
pub struct ZoneContext {
    pub dashboard_id: String,
    /// Parameter snapshot at init time
    pub parameters: HashMap<String, Value>,
    /// Filter snapshot at init time
    pub filters: Vec<Filter>,
    pub theme: String,
    pub locale: String,
    pub user: String,
}

impl ZoneContext {
    pub fn new(dashboard_id: impl Into<String>) -> Self {
        Self {
            dashboard_id: dashboard_id.into(),
            theme: "light".to_string(),
            locale: "en-US".to_string(),
            ..Self::default()
        }
    }
}

// ============================================================================
// ZONE
// ============================================================================

/// Construction parameters for a zone
#[derive(Debug, Clone)]
pub struct ZoneSpec {
    pub id: String,
    pub zone_type: String,
    pub capabilities: Capabilities,
    pub config: ZoneConfig,
}

impl ZoneSpec {
    /// Spec with the default capability set for `zone_type`
    pub fn new(id: impl Into<String>, zone_type: impl Into<String>) -> Self {
        let zone_type = zone_type.into();
        Self {
            id: id.into(),
            capabilities: Capabilities::for_zone_type(&zone_type),
            config: ZoneConfig::new(),
            zone_type,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_config(mut self, config: ZoneConfig) -> Self {
        self.config = config;
        self
    }
}

struct ZoneInner {
    state: ZoneState,
    config: ZoneConfig,
    context: Option<ZoneContext>,
    data: Option<DataPayload>,
    error: Option<String>,
    /// Zone-level filter definitions (unioned into dashboard snapshots)
    filters: Vec<Filter>,
    size: Option<(u32, u32)>,
}

/// One dashboard widget, modeled as a lifecycle state machine
pub struct Zone {
    id: String,
    zone_type: String,
    capabilities: Capabilities,
    bus: Arc<EventBus>,
    source: Arc<dyn DataSource>,
    inner: RwLock<ZoneInner>,
    /// Latest issued refresh ticket; stale completions are discarded
    latest_ticket: AtomicU64,
    /// Bus subscriptions owned by this zone, detached on destroy
    handlers: Mutex<Vec<HandlerId>>,
}

impl Zone {
    pub fn new(spec: ZoneSpec, bus: Arc<EventBus>, source: Arc<dyn DataSource>) -> Self {
        Self {
            id: spec.id,
            zone_type: spec.zone_type,
            capabilities: spec.capabilities,
            bus,
            source,
            inner: RwLock::new(ZoneInner {
                state: ZoneState::Created,
                config: spec.config,
                context: None,
                data: None,
                error: None,
                filters: Vec::new(),
                size: None,
            }),
            latest_ticket: AtomicU64::new(0),
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn zone_type(&self) -> &str {
        &self.zone_type
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn state(&self) -> ZoneState {
        self.inner.read().state
    }

    pub fn config(&self) -> ZoneConfig {
        self.inner.read().config.clone()
    }

    pub fn data(&self) -> Option<DataPayload> {
        self.inner.read().data.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.read().error.clone()
    }

    pub fn filters(&self) -> Vec<Filter> {
        self.inner.read().filters.clone()
    }

    /// Declare a zone-level filter definition
    pub fn add_filter(&self, filter: Filter) {
        self.inner.write().filters.push(filter);
    }

    /// Record a bus subscription as owned by this zone so destroy()
    /// detaches it.
    pub fn track_handler(&self, id: HandlerId) {
        self.handlers.lock().push(id);
    }

    // ─────────────────────────────────────────────────────────────
    // Lifecycle transitions
    // ─────────────────────────────────────────────────────────────

    fn transition(&self, inner: &mut ZoneInner, to: ZoneState) -> Result<(), ScoutError> {
        if inner.state == ZoneState::Destroyed {
            return Err(ScoutError::ZoneDestroyed {
                zone_id: self.id.clone(),
            });
        }
        if !inner.state.can_transition(to) {
            return Err(ScoutError::InvalidTransition {
                zone_id: self.id.clone(),
                from: inner.state.as_str(),
                to: to.as_str(),
            });
        }
        debug!(zone = %self.id, from = %inner.state, to = %to, "transition");
        inner.state = to;
        Ok(())
    }

    /// Bind context and move `created -> initializing`; emits zone:added
    pub fn init(&self, context: ZoneContext) -> Result<(), ScoutError> {
        {
            let mut inner = self.inner.write();
            self.transition(&mut inner, ZoneState::Initializing)?;
            inner.context = Some(context);
        }
        self.bus.emit(
            EventKind::ZoneAdded {
                zone_id: self.id.clone(),
                zone_type: self.zone_type.clone(),
            },
            &self.id,
        )?;
        Ok(())
    }

    /// Move `initializing -> ready` after initial setup completes
    pub fn mark_ready(&self) -> Result<(), ScoutError> {
        let mut inner = self.inner.write();
        self.transition(&mut inner, ZoneState::Ready)
    }

    // ─────────────────────────────────────────────────────────────
    // Data
    // ─────────────────────────────────────────────────────────────

    /// Return held data, fetching only when absent (or when `refresh`)
    pub async fn load_data(&self, refresh: bool) -> Result<DataPayload, ScoutError> {
        if !refresh {
            let held = self.inner.read().data.clone();
            if let Some(data) = held {
                return Ok(data.cached());
            }
        }
        self.refresh_data().await
    }

    /// Fetch a fresh payload through the data source.
    ///
    /// Emits data:requested before the fetch and data:received /
    /// data:error after, based on outcome. A completion superseded by a
    /// later refresh (or by destroy) is discarded: the zone's committed
    /// state is not touched and no data event is emitted for it.
    pub async fn refresh_data(&self) -> Result<DataPayload, ScoutError> {
        let request = {
            let mut inner = self.inner.write();
            if inner.state == ZoneState::Destroyed {
                return Err(ScoutError::ZoneDestroyed {
                    zone_id: self.id.clone(),
                });
            }
            // A refresh issued while one is already in flight stays in
            // loading; the ticket decides which completion wins.
            if inner.state != ZoneState::Loading {
                self.transition(&mut inner, ZoneState::Loading)?;
            }
            self.build_request(&inner)
        };
        let ticket = self.latest_ticket.fetch_add(1, Ordering::SeqCst) + 1;

        self.bus.emit(
            EventKind::DataRequested {
                zone_id: self.id.clone(),
            },
            &self.id,
        )?;

        let outcome = self.source.fetch(request).await;

        // Re-validate after the await: the zone may have been destroyed
        // or superseded while the fetch was in flight.
        let is_current = {
            let inner = self.inner.read();
            inner.state != ZoneState::Destroyed
                && self.latest_ticket.load(Ordering::SeqCst) == ticket
        };
        if !is_current {
            debug!(zone = %self.id, ticket, "stale completion discarded");
            return outcome;
        }

        match outcome {
            Ok(payload) => {
                {
                    let mut inner = self.inner.write();
                    inner.data = Some(payload.clone());
                    inner.error = None;
                    inner.state = ZoneState::Ready;
                }
                self.bus.emit(
                    EventKind::DataReceived {
                        zone_id: self.id.clone(),
                        row_count: payload.row_count,
                        from_cache: payload.from_cache,
                    },
                    &self.id,
                )?;
                Ok(payload)
            }
            Err(err) => {
                {
                    // Keep last-known data: stale rows with an error badge
                    // beat an empty panel.
                    let mut inner = self.inner.write();
                    inner.error = Some(err.to_string());
                    inner.state = ZoneState::Error;
                }
                self.bus.emit(
                    EventKind::DataError {
                        zone_id: self.id.clone(),
                        error: err.to_string(),
                    },
                    &self.id,
                )?;
                Err(err)
            }
        }
    }

    fn build_request(&self, inner: &ZoneInner) -> DataRequest {
        let mut request = DataRequest::new(&self.id, &self.zone_type);
        if let Some(query) = inner.config.query() {
            request.query = Some(query.to_string());
        }
        if let Some(ctx) = &inner.context {
            request.parameters = ctx.parameters.clone();
            request.filters = ctx
                .filters
                .iter()
                .filter(|f| f.applied)
                .map(|f| (f.field.clone(), f.operator.clone(), f.value.clone()))
                .collect();
        }
        request
    }

    // ─────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────

    /// Merge `partial` over the committed config, validate, commit, then
    /// refresh: configuration changes always invalidate cached data.
    ///
    /// On validation failure the committed config is left untouched and
    /// no zone:configured event is emitted.
    pub async fn configure(&self, partial: HashMap<String, Value>) -> Result<(), ScoutError> {
        let should_refresh = {
            let mut inner = self.inner.write();
            if inner.state == ZoneState::Destroyed {
                return Err(ScoutError::ZoneDestroyed {
                    zone_id: self.id.clone(),
                });
            }
            let merged = inner.config.merged_with(&partial);
            merged.validate().map_err(|details| ScoutError::InvalidConfig {
                zone_id: self.id.clone(),
                details,
            })?;
            inner.config = merged;
            matches!(
                inner.state,
                ZoneState::Ready | ZoneState::Error | ZoneState::Loading
            )
        };

        let mut keys: Vec<String> = partial.keys().cloned().collect();
        keys.sort_unstable();
        self.bus.emit(
            EventKind::ZoneConfigured {
                zone_id: self.id.clone(),
                keys,
            },
            &self.id,
        )?;

        if should_refresh {
            self.refresh_data().await?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Export, layout, selection
    // ─────────────────────────────────────────────────────────────

    /// Export currently-held data. Requesting export with no data present
    /// is a fault, not an empty file.
    pub fn export(&self, format: ExportFormat) -> Result<String, ScoutError> {
        let data = {
            let inner = self.inner.read();
            if inner.state == ZoneState::Destroyed {
                return Err(ScoutError::ZoneDestroyed {
                    zone_id: self.id.clone(),
                });
            }
            inner.data.clone().ok_or_else(|| ScoutError::NoData {
                zone_id: self.id.clone(),
            })?
        };

        self.bus.emit(
            EventKind::ExportRequested {
                zone_id: self.id.clone(),
                format: format.to_string(),
            },
            &self.id,
        )?;

        let output = render(&data, format)?;

        self.bus.emit(
            EventKind::ExportCompleted {
                zone_id: self.id.clone(),
                format: format.to_string(),
                bytes: output.len(),
            },
            &self.id,
        )?;
        Ok(output)
    }

    /// Record a new size; requires the resize capability
    pub fn resize(&self, width: u32, height: u32) -> Result<(), ScoutError> {
        if !self.capabilities.resize {
            return Err(ScoutError::MissingCapability {
                zone_id: self.id.clone(),
                capability: "resize",
            });
        }
        {
            let mut inner = self.inner.write();
            if inner.state == ZoneState::Destroyed {
                return Err(ScoutError::ZoneDestroyed {
                    zone_id: self.id.clone(),
                });
            }
            inner.size = Some((width, height));
        }
        self.bus.emit(
            EventKind::ZoneResized {
                zone_id: self.id.clone(),
                width,
                height,
            },
            &self.id,
        )?;
        Ok(())
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.inner.read().size
    }

    /// Broadcast a selection; requires the selection capability
    pub fn select(&self, values: Vec<Value>) -> Result<(), ScoutError> {
        if !self.capabilities.selection {
            return Err(ScoutError::MissingCapability {
                zone_id: self.id.clone(),
                capability: "selection",
            });
        }
        if self.state() == ZoneState::Destroyed {
            return Err(ScoutError::ZoneDestroyed {
                zone_id: self.id.clone(),
            });
        }
        self.bus.emit(
            EventKind::SelectionChanged {
                zone_id: self.id.clone(),
                values,
            },
            &self.id,
        )?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Destruction
    // ─────────────────────────────────────────────────────────────

    /// Move to the terminal state. Idempotent: the second call is a
    /// no-op. Clears data, detaches this zone's bus subscriptions and
    /// emits zone:removed exactly once. In-flight refreshes are
    /// invalidated.
    pub fn destroy(&self) -> Result<(), ScoutError> {
        {
            let mut inner = self.inner.write();
            if inner.state == ZoneState::Destroyed {
                return Ok(());
            }
            inner.state = ZoneState::Destroyed;
            inner.data = None;
            inner.error = None;
            inner.context = None;
        }
        // Invalidate any in-flight completion
        self.latest_ticket.fetch_add(1, Ordering::SeqCst);

        for id in self.handlers.lock().drain(..) {
            self.bus.off(id);
        }

        self.bus.emit(
            EventKind::ZoneRemoved {
                zone_id: self.id.clone(),
            },
            &self.id,
        )?;
        Ok(())
    }
}

impl fmt::Debug for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zone")
            .field("id", &self.id)
            .field("zone_type", &self.zone_type)
            .field("state", &self.state())
            .finish()
    }
}
