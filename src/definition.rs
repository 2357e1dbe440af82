//! Dashboard definition files (v0.1)
//!
//! Declarative YAML (`*.scout.yaml`) describing a dashboard: zones with
//! config and capability overrides, shared parameters, filters. The
//! schema tag pins the file format so old files fail loudly instead of
//! silently misloading.
//!
//! ```yaml
//! schema: scout/dashboard@0.1
//! id: sales-overview
//! zones:
//!   - id: revenue-kpi
//!     type: kpi
//!     config:
//!       title: Revenue
//!       refreshInterval: 30
//! parameters:
//!   - name: year
//!     value: 2025
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bus::EventBus;
use crate::dashboard::{Dashboard, Filter, Parameter};
use crate::error::ScoutError;
use crate::source::DataSource;
use crate::zone::{Capabilities, ZoneConfig, ZoneSpec};

/// Format tag every definition file must carry
pub const SCHEMA_TAG: &str = "scout/dashboard@0.1";

/// Zone types the runtime knows how to drive
pub const KNOWN_ZONE_TYPES: &[&str] = &["kpi", "chart", "table", "filter"];

static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_-]*$").expect("static pattern"));

// ============================================================================
// MODEL
// ============================================================================

/// Root of a `*.scout.yaml` file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardDefinition {
    pub schema: String,
    pub id: String,
    #[serde(default)]
    pub zones: Vec<ZoneDefinition>,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub zone_type: String,
    #[serde(default)]
    pub config: ZoneConfig,
    /// Overrides the zone type's default capability set when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterDefinition {
    pub field: String,
    pub operator: String,
    pub value: Value,
    /// Apply immediately on build
    #[serde(default)]
    pub applied: bool,
}

// ============================================================================
// LOADING AND VALIDATION
// ============================================================================

impl DashboardDefinition {
    pub fn from_yaml(raw: &str) -> Result<Self, ScoutError> {
        let definition: Self = serde_yaml::from_str(raw)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScoutError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// Structural validation beyond what serde enforces
    pub fn validate(&self) -> Result<(), ScoutError> {
        if self.schema != SCHEMA_TAG {
            return Err(ScoutError::InvalidDefinition {
                details: format!(
                    "schema '{}' not supported, expected '{SCHEMA_TAG}'",
                    self.schema
                ),
            });
        }
        if !ID_PATTERN.is_match(&self.id) {
            return Err(ScoutError::InvalidDefinition {
                details: format!("dashboard id '{}' is not a valid identifier", self.id),
            });
        }

        let mut seen = HashSet::new();
        for zone in &self.zones {
            if !ID_PATTERN.is_match(&zone.id) {
                return Err(ScoutError::InvalidDefinition {
                    details: format!("zone id '{}' is not a valid identifier", zone.id),
                });
            }
            if !seen.insert(zone.id.as_str()) {
                return Err(ScoutError::InvalidDefinition {
                    details: format!("duplicate zone id '{}'", zone.id),
                });
            }
            if !KNOWN_ZONE_TYPES.contains(&zone.zone_type.as_str()) {
                return Err(ScoutError::InvalidDefinition {
                    details: format!(
                        "zone '{}' has unknown type '{}'",
                        zone.id, zone.zone_type
                    ),
                });
            }
            zone.config
                .validate()
                .map_err(|details| ScoutError::InvalidDefinition {
                    details: format!("zone '{}': {details}", zone.id),
                })?;
        }

        let mut names = HashSet::new();
        for parameter in &self.parameters {
            if !names.insert(parameter.name.as_str()) {
                return Err(ScoutError::InvalidDefinition {
                    details: format!("duplicate parameter '{}'", parameter.name),
                });
            }
            if let Some(allowed) = &parameter.allowed {
                if !allowed.contains(&parameter.value) {
                    return Err(ScoutError::InvalidDefinition {
                        details: format!(
                            "parameter '{}': initial value {} not in its allow-list",
                            parameter.name, parameter.value
                        ),
                    });
                }
            }
        }

        for filter in &self.filters {
            if filter.applied && filter.value.is_null() {
                return Err(ScoutError::InvalidDefinition {
                    details: format!("filter on '{}' is applied with a null value", filter.field),
                });
            }
        }

        Ok(())
    }

    /// Assemble a live dashboard: parameters first (zones snapshot them
    /// at init), then zones, then filters.
    pub fn build(
        &self,
        bus: Arc<EventBus>,
        source: Arc<dyn DataSource>,
    ) -> Result<Dashboard, ScoutError> {
        let dashboard = Dashboard::new(&self.id, bus, source);

        for parameter in &self.parameters {
            let mut param = Parameter::new(&parameter.name, parameter.value.clone());
            if let Some(allowed) = &parameter.allowed {
                param = param.with_allowed(allowed.clone());
            }
            dashboard.define_parameter(param);
        }

        for zone in &self.zones {
            let mut spec =
                ZoneSpec::new(&zone.id, &zone.zone_type).with_config(zone.config.clone());
            if let Some(capabilities) = zone.capabilities {
                spec = spec.with_capabilities(capabilities);
            }
            dashboard.add_zone(spec)?;
        }

        for filter in &self.filters {
            if filter.applied {
                dashboard.apply_filter(&filter.field, &filter.operator, filter.value.clone())?;
            }
        }

        dashboard.initialize()?;
        Ok(dashboard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockSource;
    use serde_json::json;

    const VALID: &str = r#"
schema: scout/dashboard@0.1
id: sales-overview
zones:
  - id: revenue-kpi
    type: kpi
    config:
      title: Revenue
      refreshInterval: 30
  - id: trend-chart
    type: chart
parameters:
  - name: year
    value: 2025
    allowed: [2024, 2025]
filters:
  - field: region
    operator: in
    value: [NCR]
    applied: true
"#;

    #[test]
    fn parses_valid_definition() {
        let def = DashboardDefinition::from_yaml(VALID).unwrap();
        assert_eq!(def.id, "sales-overview");
        assert_eq!(def.zones.len(), 2);
        assert_eq!(def.zones[0].config.title(), Some("Revenue"));
        assert_eq!(def.parameters[0].value, json!(2025));
        assert!(def.filters[0].applied);
    }

    #[test]
    fn rejects_wrong_schema_tag() {
        let raw = VALID.replace("scout/dashboard@0.1", "scout/dashboard@9.9");
        let err = DashboardDefinition::from_yaml(&raw).unwrap_err();
        assert!(matches!(err, ScoutError::InvalidDefinition { .. }));
    }

    #[test]
    fn rejects_duplicate_zone_ids() {
        let raw = VALID.replace("trend-chart", "revenue-kpi");
        let err = DashboardDefinition::from_yaml(&raw).unwrap_err();
        assert!(err.to_string().contains("duplicate zone id"));
    }

    #[test]
    fn rejects_unknown_zone_type() {
        let raw = VALID.replace("type: chart", "type: hologram");
        let err = DashboardDefinition::from_yaml(&raw).unwrap_err();
        assert!(err.to_string().contains("unknown type"));
    }

    #[test]
    fn rejects_bad_zone_ids() {
        let raw = VALID.replace("trend-chart", "Trend Chart");
        assert!(DashboardDefinition::from_yaml(&raw).is_err());
    }

    #[test]
    fn rejects_invalid_config_value() {
        let raw = VALID.replace("refreshInterval: 30", "refreshInterval: 0");
        let err = DashboardDefinition::from_yaml(&raw).unwrap_err();
        assert!(err.to_string().contains("revenue-kpi"));
    }

    #[test]
    fn rejects_initial_value_outside_allow_list() {
        let raw = VALID.replace("value: 2025", "value: 2023");
        let err = DashboardDefinition::from_yaml(&raw).unwrap_err();
        assert!(err.to_string().contains("allow-list"));
    }

    #[test]
    fn rejects_malformed_yaml() {
        let err = DashboardDefinition::from_yaml("schema: [unclosed").unwrap_err();
        assert!(matches!(err, ScoutError::YamlParse(_)));
    }

    #[test]
    fn build_assembles_live_dashboard() {
        let def = DashboardDefinition::from_yaml(VALID).unwrap();
        let bus = EventBus::new();
        let dashboard = def.build(bus, Arc::new(MockSource::new())).unwrap();

        assert_eq!(dashboard.zone_count(), 2);
        assert_eq!(dashboard.parameter("year").unwrap().value, json!(2025));
        let filters = dashboard.filters();
        assert_eq!(filters.len(), 1);
        assert!(filters[0].applied);
    }

    #[test]
    fn capability_override_respected() {
        let raw = r#"
schema: scout/dashboard@0.1
id: d
zones:
  - id: locked-kpi
    type: kpi
    capabilities:
      refresh: false
"#;
        let def = DashboardDefinition::from_yaml(raw).unwrap();
        let bus = EventBus::new();
        let dashboard = def.build(bus, Arc::new(MockSource::new())).unwrap();
        let zone = dashboard.zone("locked-kpi").unwrap();
        assert!(!zone.capabilities().refresh);
        assert!(!zone.capabilities().export, "override replaces the preset");
    }
}
