pub mod admin;
pub mod health;
pub mod metrics;
pub mod metrics_handler;
pub mod server;
pub mod tracing;

pub use admin::{load_factor_response, stats_response, update_load_factor, MAX_ADMIN_BODY};
pub use health::{health_check_response, live_check_response, ready_check_response};
pub use metrics::{init_metrics, Metrics};
pub use metrics_handler::handle_metrics;
pub use server::{serve_observability, start_observability_server};
pub use tracing::init_tracing;
