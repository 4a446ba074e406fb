//! Structured admission events for the logging/alerting collaborator.
//!
//! Events are emitted on denial, near-exhaustion, internal failure, missing
//! configuration and every use of the emergency override.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tracing::{error, info, warn};

use super::category::EndpointCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    RateLimitExceeded,
    RateLimitNearExhaustion,
    PriorityLimitExceeded,
    EmergencyBypass,
    AdmissionFailure,
    QuotaMissing,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            EventType::RateLimitNearExhaustion => "RATE_LIMIT_NEAR_EXHAUSTION",
            EventType::PriorityLimitExceeded => "PRIORITY_LIMIT_EXCEEDED",
            EventType::EmergencyBypass => "EMERGENCY_BYPASS",
            EventType::AdmissionFailure => "ADMISSION_FAILURE",
            EventType::QuotaMissing => "QUOTA_MISSING",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionEvent {
    pub level: EventLevel,
    pub event_type: EventType,
    pub message: String,
    pub identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_category: Option<EndpointCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_hits: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AdmissionEvent {
    pub fn new(
        level: EventLevel,
        event_type: EventType,
        message: impl Into<String>,
        identity: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            level,
            event_type,
            message: message.into(),
            identity: identity.into(),
            endpoint_category: None,
            total_hits: None,
            limit: None,
            reset_time: None,
            path: None,
            timestamp,
        }
    }

    pub fn category(mut self, category: EndpointCategory) -> Self {
        self.endpoint_category = Some(category);
        self
    }

    pub fn usage(mut self, total_hits: u64, limit: u32, reset_time: DateTime<Utc>) -> Self {
        self.total_hits = Some(total_hits);
        self.limit = Some(limit);
        self.reset_time = Some(reset_time);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Receiver of admission events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &AdmissionEvent);
}

/// Default sink: one tracing record per event at the event's level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &AdmissionEvent) {
        let category = event.endpoint_category.map(|c| c.as_str()).unwrap_or("-");
        let reset_time = event.reset_time.map(|t| t.to_rfc3339());
        match event.level {
            EventLevel::Info => info!(
                target: "paddock::admission",
                event_type = event.event_type.as_str(),
                identity = %event.identity,
                endpoint_category = category,
                total_hits = event.total_hits,
                limit = event.limit,
                reset_time = reset_time.as_deref(),
                path = event.path.as_deref(),
                "{}",
                event.message
            ),
            EventLevel::Warn => warn!(
                target: "paddock::admission",
                event_type = event.event_type.as_str(),
                identity = %event.identity,
                endpoint_category = category,
                total_hits = event.total_hits,
                limit = event.limit,
                reset_time = reset_time.as_deref(),
                path = event.path.as_deref(),
                "{}",
                event.message
            ),
            EventLevel::Error => error!(
                target: "paddock::admission",
                event_type = event.event_type.as_str(),
                identity = %event.identity,
                endpoint_category = category,
                total_hits = event.total_hits,
                limit = event.limit,
                reset_time = reset_time.as_deref(),
                path = event.path.as_deref(),
                "{}",
                event.message
            ),
        }
    }
}

/// Sink that keeps events in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<AdmissionEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AdmissionEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn of_type(&self, event_type: EventType) -> Vec<AdmissionEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &AdmissionEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
