//! Event model for the dashboard runtime (v0.1)
//!
//! - Event: envelope with seq + timestamp + source + kind
//! - EventKind: one concrete payload shape per event type (tagged union)
//! - EventName / EventCategory: closed vocabulary for subscriptions
//!
//! Events are immutable after construction. The `seq` field is assigned by
//! the bus from a monotonic counter; `timestamp_ms` is elapsed time since
//! bus creation so replay deltas are stable across wall-clock changes.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single event as dispatched by the bus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub seq: u64,
    /// Time since bus creation (ms)
    pub timestamp_ms: u64,
    /// Free-text origin identifier ("ui", "auto-refresh", zone id, ...)
    pub source: String,
    /// Event type and payload
    pub kind: EventKind,
    /// Optional key-value annotations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

impl Event {
    /// The event's type name
    pub fn name(&self) -> EventName {
        self.kind.name()
    }

    /// The event's vocabulary group
    pub fn category(&self) -> EventCategory {
        self.kind.name().category()
    }
}

/// All event types, with one concrete payload shape each
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // DASHBOARD LIFECYCLE
    // ═══════════════════════════════════════════
    DashboardInitialized {
        dashboard_id: String,
        zone_count: usize,
    },
    DashboardDestroyed {
        dashboard_id: String,
    },
    ZoneAdded {
        zone_id: String,
        zone_type: String,
    },
    ZoneRemoved {
        zone_id: String,
    },

    // ═══════════════════════════════════════════
    // LAYOUT
    // ═══════════════════════════════════════════
    ZoneResized {
        zone_id: String,
        width: u32,
        height: u32,
    },

    // ═══════════════════════════════════════════
    // DATA
    // ═══════════════════════════════════════════
    DataRequested {
        zone_id: String,
    },
    DataReceived {
        zone_id: String,
        row_count: usize,
        from_cache: bool,
    },
    DataError {
        zone_id: String,
        error: String,
    },

    // ═══════════════════════════════════════════
    // FILTERS AND PARAMETERS
    // ═══════════════════════════════════════════
    FilterApplied {
        field: String,
        operator: String,
        value: Value,
    },
    FilterCleared {
        field: String,
    },
    ParameterChanged {
        name: String,
        old_value: Value,
        new_value: Value,
    },

    // ═══════════════════════════════════════════
    // SELECTION AND INSIGHTS
    // ═══════════════════════════════════════════
    SelectionChanged {
        zone_id: String,
        values: Vec<Value>,
    },
    InsightRequested {
        zone_id: String,
    },
    InsightReady {
        zone_id: String,
        summary: String,
    },

    // ═══════════════════════════════════════════
    // UI, EXPORT, CONFIGURATION
    // ═══════════════════════════════════════════
    ToastShown {
        message: String,
        level: String,
    },
    ExportRequested {
        zone_id: String,
        format: String,
    },
    ExportCompleted {
        zone_id: String,
        format: String,
        bytes: usize,
    },
    ZoneConfigured {
        zone_id: String,
        keys: Vec<String>,
    },

    /// Secondary event emitted when a subscriber fails.
    /// Carries the failing event's name so failures are observable
    /// without crashing the dispatch loop.
    ErrorOccurred {
        origin: String,
        error: String,
    },
}

impl EventKind {
    /// Map payload to its vocabulary name
    pub fn name(&self) -> EventName {
        match self {
            Self::DashboardInitialized { .. } => EventName::DashboardInitialized,
            Self::DashboardDestroyed { .. } => EventName::DashboardDestroyed,
            Self::ZoneAdded { .. } => EventName::ZoneAdded,
            Self::ZoneRemoved { .. } => EventName::ZoneRemoved,
            Self::ZoneResized { .. } => EventName::ZoneResized,
            Self::DataRequested { .. } => EventName::DataRequested,
            Self::DataReceived { .. } => EventName::DataReceived,
            Self::DataError { .. } => EventName::DataError,
            Self::FilterApplied { .. } => EventName::FilterApplied,
            Self::FilterCleared { .. } => EventName::FilterCleared,
            Self::ParameterChanged { .. } => EventName::ParameterChanged,
            Self::SelectionChanged { .. } => EventName::SelectionChanged,
            Self::InsightRequested { .. } => EventName::InsightRequested,
            Self::InsightReady { .. } => EventName::InsightReady,
            Self::ToastShown { .. } => EventName::ToastShown,
            Self::ExportRequested { .. } => EventName::ExportRequested,
            Self::ExportCompleted { .. } => EventName::ExportCompleted,
            Self::ZoneConfigured { .. } => EventName::ZoneConfigured,
            Self::ErrorOccurred { .. } => EventName::ErrorOccurred,
        }
    }

    /// Extract zone_id if the event is zone-scoped
    pub fn zone_id(&self) -> Option<&str> {
        match self {
            Self::ZoneAdded { zone_id, .. }
            | Self::ZoneRemoved { zone_id }
            | Self::ZoneResized { zone_id, .. }
            | Self::DataRequested { zone_id }
            | Self::DataReceived { zone_id, .. }
            | Self::DataError { zone_id, .. }
            | Self::SelectionChanged { zone_id, .. }
            | Self::InsightRequested { zone_id }
            | Self::InsightReady { zone_id, .. }
            | Self::ExportRequested { zone_id, .. }
            | Self::ExportCompleted { zone_id, .. }
            | Self::ZoneConfigured { zone_id, .. } => Some(zone_id),
            _ => None,
        }
    }
}

/// Closed vocabulary of event type names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    DashboardInitialized,
    DashboardDestroyed,
    ZoneAdded,
    ZoneRemoved,
    ZoneResized,
    DataRequested,
    DataReceived,
    DataError,
    FilterApplied,
    FilterCleared,
    ParameterChanged,
    SelectionChanged,
    InsightRequested,
    InsightReady,
    ToastShown,
    ExportRequested,
    ExportCompleted,
    ZoneConfigured,
    ErrorOccurred,
}

impl EventName {
    /// Wire representation, `domain:action`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DashboardInitialized => "dashboard:initialized",
            Self::DashboardDestroyed => "dashboard:destroyed",
            Self::ZoneAdded => "zone:added",
            Self::ZoneRemoved => "zone:removed",
            Self::ZoneResized => "zone:resized",
            Self::DataRequested => "data:requested",
            Self::DataReceived => "data:received",
            Self::DataError => "data:error",
            Self::FilterApplied => "filter:applied",
            Self::FilterCleared => "filter:cleared",
            Self::ParameterChanged => "parameter:changed",
            Self::SelectionChanged => "selection:changed",
            Self::InsightRequested => "insight:requested",
            Self::InsightReady => "insight:ready",
            Self::ToastShown => "ui:toast",
            Self::ExportRequested => "export:requested",
            Self::ExportCompleted => "export:completed",
            Self::ZoneConfigured => "zone:configured",
            Self::ErrorOccurred => "error:occurred",
        }
    }

    /// Vocabulary group for this event type
    pub fn category(&self) -> EventCategory {
        match self {
            Self::DashboardInitialized
            | Self::DashboardDestroyed
            | Self::ZoneAdded
            | Self::ZoneRemoved => EventCategory::Dashboard,
            Self::ZoneResized => EventCategory::Layout,
            Self::DataRequested | Self::DataReceived | Self::DataError => EventCategory::Data,
            Self::FilterApplied | Self::FilterCleared => EventCategory::Filter,
            Self::ParameterChanged => EventCategory::Parameter,
            Self::SelectionChanged => EventCategory::Selection,
            Self::InsightRequested | Self::InsightReady => EventCategory::Insight,
            Self::ToastShown => EventCategory::Ui,
            Self::ExportRequested | Self::ExportCompleted => EventCategory::Export,
            Self::ZoneConfigured => EventCategory::Configuration,
            Self::ErrorOccurred => EventCategory::Ui,
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event vocabulary groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Dashboard,
    Layout,
    Data,
    Filter,
    Parameter,
    Selection,
    Insight,
    Ui,
    Export,
    Configuration,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dashboard => "dashboard",
            Self::Layout => "layout",
            Self::Data => "data",
            Self::Filter => "filter",
            Self::Parameter => "parameter",
            Self::Selection => "selection",
            Self::Insight => "insight",
            Self::Ui => "ui",
            Self::Export => "export",
            Self::Configuration => "configuration",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_maps_to_name_and_category() {
        let kind = EventKind::FilterApplied {
            field: "region".into(),
            operator: "in".into(),
            value: json!(["NCR"]),
        };
        assert_eq!(kind.name(), EventName::FilterApplied);
        assert_eq!(kind.name().category(), EventCategory::Filter);
        assert_eq!(kind.name().to_string(), "filter:applied");
    }

    #[test]
    fn zone_id_extraction() {
        let kind = EventKind::DataReceived {
            zone_id: "kpi-1".into(),
            row_count: 5,
            from_cache: false,
        };
        assert_eq!(kind.zone_id(), Some("kpi-1"));

        let kind = EventKind::ParameterChanged {
            name: "year".into(),
            old_value: json!(2024),
            new_value: json!(2025),
        };
        assert_eq!(kind.zone_id(), None);
    }

    #[test]
    fn kind_serializes_with_type_tag() {
        let kind = EventKind::DataError {
            zone_id: "chart-1".into(),
            error: "timeout".into(),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "data_error");
        assert_eq!(json["zone_id"], "chart-1");
    }

    #[test]
    fn kind_deserializes_from_tagged_json() {
        let json = json!({
            "type": "zone_added",
            "zone_id": "map-1",
            "zone_type": "chart"
        });
        let kind: EventKind = serde_json::from_value(json).unwrap();
        assert_eq!(
            kind,
            EventKind::ZoneAdded {
                zone_id: "map-1".into(),
                zone_type: "chart".into(),
            }
        );
    }

    #[test]
    fn event_roundtrips_through_json() {
        let event = Event {
            seq: 7,
            timestamp_ms: 120,
            source: "ui".into(),
            kind: EventKind::ZoneRemoved {
                zone_id: "kpi-2".into(),
            },
            metadata: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn every_name_has_a_category() {
        // Exhaustiveness is enforced by the compiler; this pins the grouping
        // for the names most often subscribed to.
        assert_eq!(EventName::ZoneAdded.category(), EventCategory::Dashboard);
        assert_eq!(EventName::ZoneResized.category(), EventCategory::Layout);
        assert_eq!(EventName::DataRequested.category(), EventCategory::Data);
        assert_eq!(
            EventName::ZoneConfigured.category(),
            EventCategory::Configuration
        );
        assert_eq!(EventName::ExportCompleted.category(), EventCategory::Export);
    }
}
