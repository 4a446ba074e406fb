//! Per-request admission decision.
//!
//! [`AdmissionGate`] runs, in order: emergency override, identity
//! resolution, endpoint classification, the priority lane, the standard
//! quota check. The result is a [`GateOutcome`] carrying the decision and
//! the response headers to attach; nothing here talks HTTP on the wire.
//!
//! Faults while deciding (an identity the resolver cannot parse) admit the
//! request without quota headers and emit an error event. A category/role
//! pair with no configured quota is refused with 503.

pub mod body;
pub mod classifier;
pub mod headers;
pub mod identity;
pub mod request;

pub use body::{RejectionBody, RATE_LIMIT_CONFIG_MISSING, RATE_LIMIT_EXCEEDED};
pub use classifier::{EndpointClassifier, RouteClassifier};
pub use headers::names;
pub use identity::{HeaderIdentityResolver, IdentityResolver};
pub use request::RequestInfo;

use chrono::{DateTime, Utc};
use http::{HeaderMap, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::admission::{
    resolve_key, scale, snapshot, sweep, AdmissionEngine, AdmissionEvent, AdmissionResult, Clock,
    CounterStore, EmergencyOverride, EndpointCategory, EventLevel, EventSink, EventType, Identity,
    LoadFactor, PriorityLane, QuotaConfig, QuotaTable, Reaper, RoleTag, StatsSnapshot,
    SystemClock, TracingEventSink, TOP_CONSUMERS,
};
use crate::config::Config;
use crate::error::{GateError, Result};
use crate::telemetry::metrics::values;
use crate::telemetry::Metrics;

/// What the gate decided for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Within quota (or admission control disabled).
    Allowed,
    /// Quota exhausted. Answer 429 with the body.
    Denied(Box<RejectionBody>),
    /// Valid emergency token. No quota was consumed.
    Bypassed,
    /// Internal fault while deciding. Admitted without a check.
    FailedOpen,
    /// No quota configured for the caller. Answer 503 with the body.
    Unconfigured(Box<RejectionBody>),
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Allowed => values::DECISION_ALLOWED,
            Decision::Denied(_) => values::DECISION_DENIED,
            Decision::Bypassed => values::DECISION_BYPASSED,
            Decision::FailedOpen => values::DECISION_FAILED_OPEN,
            Decision::Unconfigured(_) => values::DECISION_UNCONFIGURED,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub decision: Decision,
    pub headers: HeaderMap,
    pub category: Option<EndpointCategory>,
}

impl GateOutcome {
    fn new(decision: Decision, headers: HeaderMap, category: Option<EndpointCategory>) -> Self {
        Self { decision, headers, category }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self.decision, Decision::Allowed | Decision::Bypassed | Decision::FailedOpen)
    }

    pub fn status(&self) -> StatusCode {
        match self.decision {
            Decision::Denied(_) => StatusCode::TOO_MANY_REQUESTS,
            Decision::Unconfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::OK,
        }
    }

    pub fn body(&self) -> Option<&RejectionBody> {
        match &self.decision {
            Decision::Denied(body) | Decision::Unconfigured(body) => Some(body),
            _ => None,
        }
    }
}

pub struct AdmissionGate {
    engine: AdmissionEngine,
    table: QuotaTable,
    classifier: Arc<dyn EndpointClassifier>,
    resolver: Arc<dyn IdentityResolver>,
    priority: Option<PriorityLane>,
    emergency: EmergencyOverride,
    load_factor: LoadFactor,
    adaptive: bool,
    near_exhaustion_ratio: f64,
    enabled: bool,
    events: Arc<dyn EventSink>,
    metrics: Option<Arc<Metrics>>,
}

impl AdmissionGate {
    pub fn builder(table: QuotaTable) -> GateBuilder {
        GateBuilder::new(table)
    }

    /// Decide one request.
    pub fn admit(&self, request: &RequestInfo<'_>) -> GateOutcome {
        let started = Instant::now();
        let outcome = self.decide(request);
        if let Some(m) = &self.metrics {
            m.record_decision(
                outcome.decision.label(),
                outcome.category,
                started.elapsed().as_secs_f64(),
            );
        }
        outcome
    }

    fn decide(&self, request: &RequestInfo<'_>) -> GateOutcome {
        if !self.enabled {
            return GateOutcome::new(Decision::Allowed, HeaderMap::new(), None);
        }

        let now = self.engine.now();
        if self.check_override(request.header(names::EMERGENCY_TOKEN)) {
            return self.bypass(request, now);
        }

        match self.evaluate(request, now) {
            Ok(outcome) => outcome,
            Err(e) => self.fail_open(request, now, &e),
        }
    }

    fn evaluate(&self, request: &RequestInfo<'_>, now: DateTime<Utc>) -> Result<GateOutcome> {
        let identity = self.resolver.resolve(request)?;
        if let Some(m) = &self.metrics {
            m.record_request(if identity.is_authenticated() {
                values::IDENTITY_USER
            } else {
                values::IDENTITY_ANONYMOUS
            });
        }
        let category = self.classifier.classify(request.method, request.path);

        if let Some(lane) = &self.priority {
            if let Some(result) = lane.check(&self.engine, &identity) {
                if let Some(m) = &self.metrics {
                    m.record_priority(result.allowed);
                }
                if !result.allowed {
                    self.emit(
                        AdmissionEvent::new(
                            EventLevel::Warn,
                            EventType::PriorityLimitExceeded,
                            "Priority lane limit exceeded",
                            identity.label(),
                            now,
                        )
                        .category(category)
                        .usage(result.total_hits, lane.quota.max_requests, result.reset_at)
                        .path(request.path),
                    );
                    return Ok(self.reject(&lane.quota, &result, now, request, category));
                }
                if lane.skip_standard {
                    self.note_near_exhaustion(&identity, category, &lane.quota, &result, request, now);
                    return Ok(GateOutcome::new(
                        Decision::Allowed,
                        headers::quota_headers(&lane.quota, &result),
                        Some(category),
                    ));
                }
            }
        }

        let Some(quota) = self.quota_for(&identity, category) else {
            self.emit(
                AdmissionEvent::new(
                    EventLevel::Error,
                    EventType::QuotaMissing,
                    "No quota configured; refusing request",
                    identity.label(),
                    now,
                )
                .category(category)
                .path(request.path),
            );
            if let Some(m) = &self.metrics {
                m.record_quota_missing(category);
            }
            let body = RejectionBody::unconfigured(now, request.path, request.method.as_str());
            return Ok(GateOutcome::new(
                Decision::Unconfigured(Box::new(body)),
                HeaderMap::new(),
                Some(category),
            ));
        };

        let key = resolve_key(&identity, category);
        let result = self.engine.check_and_increment(&key, &quota);

        if !result.allowed {
            self.emit(
                AdmissionEvent::new(
                    EventLevel::Warn,
                    EventType::RateLimitExceeded,
                    "Rate limit exceeded",
                    identity.label(),
                    now,
                )
                .category(category)
                .usage(result.total_hits, quota.max_requests, result.reset_at)
                .path(request.path),
            );
            return Ok(self.reject(&quota, &result, now, request, category));
        }

        self.note_near_exhaustion(&identity, category, &quota, &result, request, now);

        debug!(key = %key, remaining = result.remaining, "Admission check passed");
        Ok(GateOutcome::new(
            Decision::Allowed,
            headers::quota_headers(&quota, &result),
            Some(category),
        ))
    }

    fn note_near_exhaustion(
        &self,
        identity: &Identity,
        category: EndpointCategory,
        quota: &QuotaConfig,
        result: &AdmissionResult,
        request: &RequestInfo<'_>,
        now: DateTime<Utc>,
    ) {
        if !result.is_near_exhaustion(quota, self.near_exhaustion_ratio) {
            return;
        }
        self.emit(
            AdmissionEvent::new(
                EventLevel::Warn,
                EventType::RateLimitNearExhaustion,
                "Rate limit nearly exhausted",
                identity.label(),
                now,
            )
            .category(category)
            .usage(result.total_hits, quota.max_requests, result.reset_at)
            .path(request.path),
        );
        if let Some(m) = &self.metrics {
            m.record_near_exhaustion(category);
        }
    }

    /// Quota for this caller after adaptive scaling. `None` only for an
    /// authenticated caller whose (category, role) cell is empty.
    fn quota_for(&self, identity: &Identity, category: EndpointCategory) -> Option<QuotaConfig> {
        let base = if identity.is_authenticated() {
            self.table
                .lookup(category, identity.role.unwrap_or(RoleTag::Guest))?
        } else {
            self.table.fallback()
        };
        Some(if self.adaptive { scale(&base, self.load_factor.get()) } else { base })
    }

    fn reject(
        &self,
        quota: &QuotaConfig,
        result: &AdmissionResult,
        now: DateTime<Utc>,
        request: &RequestInfo<'_>,
        category: EndpointCategory,
    ) -> GateOutcome {
        let body =
            RejectionBody::exceeded(quota, result, now, request.path, request.method.as_str());
        GateOutcome::new(
            Decision::Denied(Box::new(body)),
            headers::denial_headers(quota, result, now),
            Some(category),
        )
    }

    fn bypass(&self, request: &RequestInfo<'_>, now: DateTime<Utc>) -> GateOutcome {
        let who = self
            .resolver
            .resolve(request)
            .map(|identity| identity.label())
            .unwrap_or_else(|_| format!("ip:{}", request.peer.ip()));
        self.emit(
            AdmissionEvent::new(
                EventLevel::Warn,
                EventType::EmergencyBypass,
                "Emergency override used; admission checks skipped",
                who,
                now,
            )
            .path(request.path),
        );
        if let Some(m) = &self.metrics {
            m.record_emergency_bypass();
        }
        GateOutcome::new(Decision::Bypassed, headers::bypass_headers(), None)
    }

    fn fail_open(&self, request: &RequestInfo<'_>, now: DateTime<Utc>, error: &GateError) -> GateOutcome {
        self.emit(
            AdmissionEvent::new(
                EventLevel::Error,
                EventType::AdmissionFailure,
                format!("Admission check failed, allowing request: {error}"),
                format!("ip:{}", request.peer.ip()),
                now,
            )
            .path(request.path),
        );
        if let Some(m) = &self.metrics {
            m.record_failed_open(match error {
                GateError::Identity(_) => values::REASON_IDENTITY,
                _ => values::REASON_INTERNAL,
            });
        }
        GateOutcome::new(Decision::FailedOpen, HeaderMap::new(), None)
    }

    fn emit(&self, event: AdmissionEvent) {
        self.events.emit(&event);
    }

    /// Constant-time comparison against the configured override secret.
    pub fn check_override(&self, token: Option<&str>) -> bool {
        self.emergency.check(token)
    }

    /// Current load factor.
    pub fn load_factor(&self) -> f64 {
        self.load_factor.get()
    }

    /// Set the load factor, returning the value applied after clamping.
    pub fn set_load_factor(&self, factor: f64) -> Result<f64> {
        let applied = self.load_factor.set(factor)?;
        info!(requested = factor, applied, "Load factor updated");
        if let Some(m) = &self.metrics {
            m.record_load_factor(applied);
        }
        Ok(applied)
    }

    pub fn reset_load_factor(&self) {
        self.load_factor.reset();
        if let Some(m) = &self.metrics {
            m.record_load_factor(self.load_factor.get());
        }
    }

    pub fn load_factor_bounds(&self) -> (f64, f64) {
        self.load_factor.bounds()
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn stats(&self) -> StatsSnapshot {
        snapshot(self.engine.store(), self.engine.now(), TOP_CONSUMERS)
    }

    /// Remove expired windows now, outside the reaper schedule.
    pub fn sweep(&self) -> usize {
        sweep(self.engine.store(), self.engine.clock().as_ref())
    }

    pub fn start_reaper(&self, every: Duration) -> Reaper {
        Reaper::start(
            Arc::clone(self.engine.store()),
            Arc::clone(self.engine.clock()),
            every,
            self.metrics.clone(),
        )
    }

    pub fn engine(&self) -> &AdmissionEngine {
        &self.engine
    }

    pub fn table(&self) -> &QuotaTable {
        &self.table
    }
}

pub struct GateBuilder {
    table: QuotaTable,
    classifier: Arc<dyn EndpointClassifier>,
    resolver: Arc<dyn IdentityResolver>,
    clock: Arc<dyn Clock>,
    shards: usize,
    priority: Option<PriorityLane>,
    emergency: EmergencyOverride,
    load_factor: LoadFactor,
    adaptive: bool,
    near_exhaustion_ratio: f64,
    enabled: bool,
    events: Arc<dyn EventSink>,
    metrics: Option<Arc<Metrics>>,
}

impl GateBuilder {
    pub fn new(table: QuotaTable) -> Self {
        Self {
            table,
            classifier: Arc::new(RouteClassifier::new(&[], EndpointCategory::ResourceRead)),
            resolver: Arc::new(HeaderIdentityResolver::default()),
            clock: Arc::new(SystemClock),
            shards: crate::admission::store::DEFAULT_SHARDS,
            priority: None,
            emergency: EmergencyOverride::default(),
            load_factor: LoadFactor::default(),
            adaptive: false,
            near_exhaustion_ratio: 0.8,
            enabled: true,
            events: Arc::new(TracingEventSink),
            metrics: None,
        }
    }

    /// Everything the config file describes. Sinks, clock and metrics are
    /// left at their defaults.
    pub fn from_config(config: &Config) -> Result<Self> {
        let admission = &config.admission;
        let table = admission.quota_table()?;

        let priority = if admission.priority.enabled {
            Some(PriorityLane {
                role: admission.priority.role,
                lane: admission.priority.lane.clone(),
                quota: QuotaConfig::new(
                    Duration::from_secs(admission.priority.window_seconds),
                    admission.priority.max_requests,
                )?,
                skip_standard: admission.priority.skip_standard,
            })
        } else {
            None
        };

        Ok(Self::new(table)
            .classifier(RouteClassifier::new(&config.routes, config.default_category))
            .resolver(HeaderIdentityResolver::new(&config.identity)?)
            .shards(admission.shards)
            .priority(priority)
            .emergency(EmergencyOverride::new(admission.emergency.token.clone()))
            .load_factor(LoadFactor::new(
                admission.adaptive.min_factor,
                admission.adaptive.max_factor,
            )?)
            .adaptive(admission.adaptive.enabled)
            .near_exhaustion_ratio(admission.near_exhaustion_ratio)
            .enabled(admission.enabled))
    }

    pub fn classifier(mut self, classifier: impl EndpointClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn resolver(mut self, resolver: impl IdentityResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    pub fn priority(mut self, lane: Option<PriorityLane>) -> Self {
        self.priority = lane;
        self
    }

    pub fn emergency(mut self, emergency: EmergencyOverride) -> Self {
        self.emergency = emergency;
        self
    }

    pub fn load_factor(mut self, load_factor: LoadFactor) -> Self {
        self.load_factor = load_factor;
        self
    }

    pub fn adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    pub fn near_exhaustion_ratio(mut self, ratio: f64) -> Self {
        self.near_exhaustion_ratio = ratio;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> AdmissionGate {
        let store = Arc::new(CounterStore::new(self.shards));
        AdmissionGate {
            engine: AdmissionEngine::new(store, self.clock),
            table: self.table,
            classifier: self.classifier,
            resolver: self.resolver,
            priority: self.priority,
            emergency: self.emergency,
            load_factor: self.load_factor,
            adaptive: self.adaptive,
            near_exhaustion_ratio: self.near_exhaustion_ratio,
            enabled: self.enabled,
            events: self.events,
            metrics: self.metrics,
        }
    }
}
