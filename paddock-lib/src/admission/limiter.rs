//! Fixed-window admission engine.
//!
//! Wraps a [`CounterStore`] with the allow/deny decision. The increment is
//! atomic per key; the decision is computed from the post-increment count, so
//! concurrent callers can never both observe the same count.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::clock::{Clock, SystemClock};
use super::quota::QuotaConfig;
use super::store::{CounterStore, Window};

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionResult {
    pub allowed: bool,
    /// Requests left in the current window, never negative
    pub remaining: u32,
    /// When the current window ends
    pub reset_at: DateTime<Utc>,
    /// Hits recorded in the current window, denied ones included
    pub total_hits: u64,
}

impl AdmissionResult {
    fn from_window(window: Window, quota: &QuotaConfig) -> Self {
        let max = u64::from(quota.max_requests);
        let remaining = max.saturating_sub(window.count);
        Self {
            allowed: window.count <= max,
            remaining: u32::try_from(remaining).unwrap_or(u32::MAX),
            reset_at: window.end,
            total_hits: window.count,
        }
    }

    /// Whether at least `ratio` of the quota is consumed.
    pub fn is_near_exhaustion(&self, quota: &QuotaConfig, ratio: f64) -> bool {
        if quota.max_requests == 0 {
            return false;
        }
        self.total_hits as f64 >= f64::from(quota.max_requests) * ratio
    }

    /// Whole seconds until the window resets, rounded up, measured from `now`.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000)
    }
}

/// Admission engine over an explicitly constructed counter store.
pub struct AdmissionEngine {
    store: Arc<CounterStore>,
    clock: Arc<dyn Clock>,
}

impl AdmissionEngine {
    pub fn new(store: Arc<CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Engine with its own store and the system clock.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(CounterStore::default()), Arc::new(SystemClock))
    }

    /// Record a hit for `key` and decide against `quota`.
    ///
    /// `quota` is taken by reference and never stored: callers pass scaled
    /// copies for a single check.
    pub fn check_and_increment(&self, key: &str, quota: &QuotaConfig) -> AdmissionResult {
        let now = self.clock.now();
        let window = self.store.hit(key, now, quota.window);
        AdmissionResult::from_window(window, quota)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn store(&self) -> &Arc<CounterStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
