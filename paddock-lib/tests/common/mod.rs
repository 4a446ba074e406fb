//! Shared helpers for admission tests
#![allow(dead_code)]

use http::{HeaderMap, HeaderValue, Method};
use paddock_lib::admission::{EndpointCategory, ManualClock, QuotaConfig, QuotaTable, RecordingEventSink};
use paddock_lib::gate::{AdmissionGate, GateBuilder, GateOutcome, RequestInfo};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub fn quota(window_secs: u64, max_requests: u32) -> QuotaConfig {
    match QuotaConfig::new(Duration::from_secs(window_secs), max_requests) {
        Ok(quota) => quota,
        Err(e) => panic!("quota: {e}"),
    }
}

/// Every (category, role) cell set to `max` per 60s; anonymous fallback `fallback` per 900s
pub fn uniform_table(max: u32, fallback: u32) -> QuotaTable {
    let mut table = QuotaTable::new(quota(900, fallback));
    for category in EndpointCategory::ALL {
        table.set_category(category, quota(60, max));
    }
    table
}

pub struct Harness {
    pub gate: AdmissionGate,
    pub clock: ManualClock,
    pub events: Arc<RecordingEventSink>,
}

pub fn harness(builder: GateBuilder) -> Harness {
    let clock = ManualClock::default();
    let events = Arc::new(RecordingEventSink::new());
    let gate = builder
        .clock(Arc::new(clock.clone()))
        .events(events.clone())
        .build();
    Harness { gate, clock, events }
}

pub fn peer(ip: [u8; 4]) -> SocketAddr {
    SocketAddr::from((ip, 41000))
}

pub fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.insert(*name, HeaderValue::from_static(value));
    }
    map
}

pub fn admit(gate: &AdmissionGate, method: Method, path: &str, headers: &HeaderMap, peer: SocketAddr) -> GateOutcome {
    gate.admit(&RequestInfo::new(&method, path, headers, peer))
}

pub fn header<'a>(outcome: &'a GateOutcome, name: &str) -> Option<&'a str> {
    outcome.headers.get(name).and_then(|v| v.to_str().ok())
}
