mod admission;
mod identity;
mod loader;
mod routes;
mod telemetry;
mod types;

pub use admission::{
    AdaptiveConfig, AdmissionConfig, EmergencyConfig, PriorityConfig, QuotaRow, QuotaSpec,
};
pub use identity::IdentityConfig;
pub use loader::{load_from_path, load_from_str, validate_config};
pub use routes::RouteRule;
pub use telemetry::{LoggingConfig, TelemetryConfig};
pub use types::Config;
