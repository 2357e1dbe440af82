//! Scout - event-driven dashboard runtime

pub mod bus;
pub mod dashboard;
pub mod definition;
pub mod error;
pub mod event;
pub mod export;
pub mod middleware;
pub mod settings;
pub mod source;
pub mod zone;

pub use bus::{EventBus, HandlerId, Middleware, Next};
pub use dashboard::{Dashboard, Filter, Parameter};
pub use definition::DashboardDefinition;
pub use error::{FixSuggestion, ScoutError};
pub use event::{Event, EventCategory, EventKind, EventName};
pub use export::ExportFormat;
pub use settings::{FileSettings, MemorySettings, SettingsStore};
pub use source::{create_source, DataPayload, DataRequest, DataSource};
pub use zone::{Capabilities, Zone, ZoneConfig, ZoneContext, ZoneSpec, ZoneState};
