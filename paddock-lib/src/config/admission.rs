use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::admission::{EndpointCategory, QuotaConfig, QuotaTable, RoleTag};
use crate::error::{GateError, Result};

/// Admission control configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AdmissionConfig {
    /// Enable admission control
    /// When false every request is allowed and no counters are kept
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Number of counter store shards (one mutex each)
    /// Default: 16
    #[serde(default = "default_shards")]
    pub shards: usize,
    /// Interval between reaper sweeps of expired counters, in seconds
    /// Default: 60
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,
    /// Fraction of a quota after which a near-exhaustion event is emitted
    /// Default: 0.8
    #[serde(default = "default_near_exhaustion_ratio")]
    pub near_exhaustion_ratio: f64,
    /// Reject configurations where some (category, role) pair has no quota
    /// Default: true
    #[serde(default = "default_true")]
    pub require_complete_table: bool,
    /// Quota for unauthenticated callers, keyed by network address
    #[serde(default = "default_fallback")]
    pub fallback: QuotaSpec,
    /// Per-category quota applied to every role unless a row overrides it
    #[serde(default = "default_category_quotas")]
    pub defaults: BTreeMap<EndpointCategory, QuotaSpec>,
    /// Per-(category, role) overrides
    #[serde(default)]
    pub quotas: Vec<QuotaRow>,
    /// Priority lane for one privileged role
    #[serde(default)]
    pub priority: PriorityConfig,
    /// Emergency override
    #[serde(default)]
    pub emergency: EmergencyConfig,
    /// Adaptive rescaling under load
    #[serde(default)]
    pub adaptive: AdaptiveConfig,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            shards: default_shards(),
            reaper_interval_secs: default_reaper_interval(),
            near_exhaustion_ratio: default_near_exhaustion_ratio(),
            require_complete_table: true,
            fallback: default_fallback(),
            defaults: default_category_quotas(),
            quotas: Vec::new(),
            priority: PriorityConfig::default(),
            emergency: EmergencyConfig::default(),
            adaptive: AdaptiveConfig::default(),
        }
    }
}

impl AdmissionConfig {
    /// Build the quota matrix: category defaults first, then explicit rows.
    pub fn quota_table(&self) -> Result<QuotaTable> {
        let mut table = QuotaTable::new(self.fallback.to_quota()?);
        for (category, spec) in &self.defaults {
            table.set_category(*category, spec.to_quota()?);
        }
        for row in &self.quotas {
            table.set(row.category, row.role, row.spec.to_quota()?);
        }

        if self.require_complete_table {
            let missing = table.missing_pairs();
            if !missing.is_empty() {
                let pairs = missing
                    .iter()
                    .map(|(c, r)| format!("{c}/{r}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(GateError::Config(format!("No quota configured for: {pairs}")));
            }
        }

        Ok(table)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }
}

/// One quota: `max_requests` per `window_seconds`
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSpec {
    /// Window length in seconds (must be > 0)
    pub window_seconds: u64,
    /// Requests allowed per window; 0 denies every request
    pub max_requests: u32,
}

impl QuotaSpec {
    pub const fn new(window_seconds: u64, max_requests: u32) -> Self {
        Self { window_seconds, max_requests }
    }

    pub fn to_quota(&self) -> Result<QuotaConfig> {
        QuotaConfig::new(Duration::from_secs(self.window_seconds), self.max_requests)
    }
}

/// Quota override for one (category, role) pair
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct QuotaRow {
    pub category: EndpointCategory,
    pub role: RoleTag,
    #[serde(flatten)]
    pub spec: QuotaSpec,
}

/// Priority lane configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PriorityConfig {
    /// Enable the priority lane
    /// Default: false
    #[serde(default)]
    pub enabled: bool,
    /// Role allowed to use the lane
    /// Default: "super_admin"
    #[serde(default = "default_priority_role")]
    pub role: RoleTag,
    /// Lane name, part of the counter key
    /// Default: "default"
    #[serde(default = "default_lane")]
    pub lane: String,
    /// Window length in seconds
    /// Default: 60
    #[serde(default = "default_priority_window")]
    pub window_seconds: u64,
    /// Requests allowed per window
    /// Default: 10000
    #[serde(default = "default_priority_max")]
    pub max_requests: u32,
    /// Skip the standard per-category check for eligible callers
    /// When false, privileged callers consume from both lanes
    /// Default: false
    #[serde(default)]
    pub skip_standard: bool,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            role: default_priority_role(),
            lane: default_lane(),
            window_seconds: default_priority_window(),
            max_requests: default_priority_max(),
            skip_standard: false,
        }
    }
}

/// Emergency override configuration
#[derive(Deserialize, Clone, PartialEq, Default)]
pub struct EmergencyConfig {
    /// Shared secret compared against the `X-Emergency-Token` header
    /// Can be supplied with PADDOCK_EMERGENCY_TOKEN instead of the file
    /// Default: none (override disabled)
    #[serde(default)]
    pub token: Option<String>,
}

impl std::fmt::Debug for EmergencyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmergencyConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Adaptive scaling configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AdaptiveConfig {
    /// Apply the current load factor to standard quotas
    /// Default: false
    #[serde(default)]
    pub enabled: bool,
    /// Lowest accepted load factor
    /// Default: 0.1
    #[serde(default = "default_min_factor")]
    pub min_factor: f64,
    /// Highest accepted load factor
    /// Default: 1.0
    #[serde(default = "default_max_factor")]
    pub max_factor: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self { enabled: false, min_factor: default_min_factor(), max_factor: default_max_factor() }
    }
}

fn default_true() -> bool {
    true
}

fn default_shards() -> usize {
    crate::admission::store::DEFAULT_SHARDS
}

fn default_reaper_interval() -> u64 {
    60
}

fn default_near_exhaustion_ratio() -> f64 {
    0.8
}

fn default_fallback() -> QuotaSpec {
    QuotaSpec::new(900, 100)
}

/// Built-in per-category quotas
fn default_category_quotas() -> BTreeMap<EndpointCategory, QuotaSpec> {
    BTreeMap::from([
        (EndpointCategory::Auth, QuotaSpec::new(900, 5)),
        (EndpointCategory::ResourceRead, QuotaSpec::new(60, 300)),
        (EndpointCategory::ResourceWrite, QuotaSpec::new(60, 60)),
        (EndpointCategory::Reports, QuotaSpec::new(60, 10)),
        (EndpointCategory::FileUpload, QuotaSpec::new(3600, 20)),
        (EndpointCategory::Bulk, QuotaSpec::new(3600, 5)),
        (EndpointCategory::ExternalCall, QuotaSpec::new(60, 30)),
        (EndpointCategory::Geo, QuotaSpec::new(60, 60)),
    ])
}

fn default_priority_role() -> RoleTag {
    RoleTag::SuperAdmin
}

fn default_lane() -> String {
    "default".to_string()
}

fn default_priority_window() -> u64 {
    60
}

fn default_priority_max() -> u32 {
    10_000
}

fn default_min_factor() -> f64 {
    0.1
}

fn default_max_factor() -> f64 {
    1.0
}
