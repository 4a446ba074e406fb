use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;

use crate::admission::EndpointCategory;

pub mod labels {
    pub const CATEGORY: &str = "category";
    pub const DECISION: &str = "decision";
    pub const IDENTITY_KIND: &str = "identity_kind";
    pub const REASON: &str = "reason";
    pub const STATUS_CODE: &str = "status_code";
    pub const VERSION: &str = "version";
    pub const RUST_VERSION: &str = "rust_version";
}

pub mod values {
    pub const DECISION_ALLOWED: &str = "allowed";
    pub const DECISION_DENIED: &str = "denied";
    pub const DECISION_BYPASSED: &str = "bypassed";
    pub const DECISION_FAILED_OPEN: &str = "failed_open";
    pub const DECISION_UNCONFIGURED: &str = "unconfigured";
    pub const IDENTITY_USER: &str = "user";
    pub const IDENTITY_ANONYMOUS: &str = "anonymous";
    pub const REASON_IDENTITY: &str = "identity";
    pub const REASON_INTERNAL: &str = "internal";
}

#[derive(Clone)]
pub struct Metrics {
    // Admission decisions
    pub admission_requests_total: Counter<u64>,
    pub admission_decisions_total: Counter<u64>,
    pub admission_duration_seconds: Histogram<f64>,
    pub near_exhaustion_total: Counter<u64>,

    // Priority lane and override
    pub priority_requests_total: Counter<u64>,
    pub priority_rejected_total: Counter<u64>,
    pub emergency_bypass_total: Counter<u64>,

    // Faults
    pub failed_open_total: Counter<u64>,
    pub quota_missing_total: Counter<u64>,

    // Counter store
    pub store_keys: Gauge<u64>,
    pub reaped_windows_total: Counter<u64>,
    pub load_factor: Gauge<f64>,

    // Forward-auth surface
    pub http_responses_total: Counter<u64>,

    // Build info
    pub build_info: Gauge<u64>,
}

impl Metrics {
    fn new(meter: Meter) -> Self {
        Self {
            admission_requests_total: meter
                .u64_counter("paddock_admission_requests_total")
                .with_description("Total number of requests evaluated by the admission gate")
                .build(),
            admission_decisions_total: meter
                .u64_counter("paddock_admission_decisions_total")
                .with_description("Admission decisions by outcome and endpoint category")
                .build(),
            admission_duration_seconds: meter
                .f64_histogram("paddock_admission_duration_seconds")
                .with_description("Time spent deciding a single request in seconds")
                .build(),
            near_exhaustion_total: meter
                .u64_counter("paddock_near_exhaustion_total")
                .with_description("Admitted requests that used at least the warning share of their quota")
                .build(),

            priority_requests_total: meter
                .u64_counter("paddock_priority_requests_total")
                .with_description("Total number of requests checked against the priority lane")
                .build(),
            priority_rejected_total: meter
                .u64_counter("paddock_priority_rejected_total")
                .with_description("Total number of requests rejected by the priority lane (429)")
                .build(),
            emergency_bypass_total: meter
                .u64_counter("paddock_emergency_bypass_total")
                .with_description("Total number of requests admitted through the emergency override")
                .build(),

            failed_open_total: meter
                .u64_counter("paddock_failed_open_total")
                .with_description("Requests admitted without a check because of an internal fault")
                .build(),
            quota_missing_total: meter
                .u64_counter("paddock_quota_missing_total")
                .with_description("Requests refused because no quota was configured (503)")
                .build(),

            store_keys: meter
                .u64_gauge("paddock_store_keys")
                .with_description("Number of windows held by the counter store after the last sweep")
                .build(),
            reaped_windows_total: meter
                .u64_counter("paddock_reaped_windows_total")
                .with_description("Total number of expired windows removed by the reaper")
                .build(),
            load_factor: meter
                .f64_gauge("paddock_load_factor")
                .with_description("Current adaptive load factor applied to quotas")
                .build(),

            http_responses_total: meter
                .u64_counter("paddock_http_responses_total")
                .with_description("Forward-auth responses by status code")
                .build(),

            build_info: meter
                .u64_gauge("paddock_build_info")
                .with_description("Build information (version, rust version)")
                .build(),
        }
    }

    /// Set build info metric with version labels
    pub fn set_build_info(&self) {
        let version = env!("CARGO_PKG_VERSION");
        let rust_version = env!("CARGO_PKG_RUST_VERSION");

        self.build_info.record(
            1,
            &[
                KeyValue::new(labels::VERSION, version),
                KeyValue::new(labels::RUST_VERSION, rust_version),
            ],
        );
    }

    pub fn record_request(&self, identity_kind: &'static str) {
        self.admission_requests_total
            .add(1, &[KeyValue::new(labels::IDENTITY_KIND, identity_kind)]);
    }

    pub fn record_decision(
        &self,
        decision: &'static str,
        category: Option<EndpointCategory>,
        duration: f64,
    ) {
        let category = category.map(|c| c.as_str()).unwrap_or("none");
        let attrs = [
            KeyValue::new(labels::DECISION, decision),
            KeyValue::new(labels::CATEGORY, category),
        ];
        self.admission_decisions_total.add(1, &attrs);
        self.admission_duration_seconds.record(duration, &attrs);
    }

    pub fn record_near_exhaustion(&self, category: EndpointCategory) {
        self.near_exhaustion_total
            .add(1, &[KeyValue::new(labels::CATEGORY, category.as_str())]);
    }

    pub fn record_priority(&self, allowed: bool) {
        self.priority_requests_total.add(1, &[]);
        if !allowed {
            self.priority_rejected_total.add(1, &[]);
        }
    }

    pub fn record_emergency_bypass(&self) {
        self.emergency_bypass_total.add(1, &[]);
    }

    pub fn record_failed_open(&self, reason: &'static str) {
        self.failed_open_total
            .add(1, &[KeyValue::new(labels::REASON, reason)]);
    }

    pub fn record_quota_missing(&self, category: EndpointCategory) {
        self.quota_missing_total
            .add(1, &[KeyValue::new(labels::CATEGORY, category.as_str())]);
    }

    pub fn record_reaped(&self, count: u64) {
        if count > 0 {
            self.reaped_windows_total.add(count, &[]);
        }
    }

    pub fn record_store_size(&self, keys: u64) {
        self.store_keys.record(keys, &[]);
    }

    pub fn record_load_factor(&self, factor: f64) {
        self.load_factor.record(factor, &[]);
    }

    pub fn record_http_response(&self, status_code: u16) {
        self.http_responses_total
            .add(1, &[KeyValue::new(labels::STATUS_CODE, status_code.to_string())]);
    }
}

pub fn init_metrics() -> Result<(Arc<Metrics>, Registry), Box<dyn std::error::Error + Send + Sync>>
{
    let registry = Registry::default();

    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()?;

    let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

    global::set_meter_provider(meter_provider);

    let meter = global::meter("paddock");
    let metrics = Arc::new(Metrics::new(meter));

    metrics.set_build_info();

    Ok((metrics, registry))
}
