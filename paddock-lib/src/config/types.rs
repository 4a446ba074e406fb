use serde::Deserialize;
use std::net::SocketAddr;

use super::admission::AdmissionConfig;
use super::identity::IdentityConfig;
use super::routes::RouteRule;
use super::telemetry::{LoggingConfig, TelemetryConfig};
use crate::admission::EndpointCategory;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Address and port the admission endpoint listens on
    /// Example: "0.0.0.0:7000" or "127.0.0.1:8080"
    pub listen: SocketAddr,
    /// Seconds to wait for open connections on shutdown
    /// Default: 10
    #[serde(default = "default_shutdown_secs")]
    pub shutdown_secs: u64,
    /// Category for requests that match no route rule
    /// Default: "resource_read"
    #[serde(default = "default_category")]
    pub default_category: EndpointCategory,
    /// Route classification rules
    /// Default: empty (every request gets `default_category`)
    #[serde(default)]
    pub routes: Vec<RouteRule>,
    /// Caller identification
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Admission control (quotas, priority lane, override, adaptive scaling)
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_shutdown_secs() -> u64 {
    10
}

fn default_category() -> EndpointCategory {
    EndpointCategory::ResourceRead
}
