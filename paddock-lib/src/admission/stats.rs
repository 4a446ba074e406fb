use chrono::{DateTime, Utc};
use serde::Serialize;

use super::store::CounterStore;

pub const TOP_CONSUMERS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopConsumer {
    pub key: String,
    pub count: u64,
    pub window_end: DateTime<Utc>,
}

/// Read-only view of the counter store at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Entries held, expired ones not yet reaped included
    pub total_keys: usize,
    /// Entries whose window is still open
    pub active_windows: usize,
    /// Heaviest open windows, highest count first
    pub top_consumers: Vec<TopConsumer>,
    pub taken_at: DateTime<Utc>,
}

/// Build a snapshot. Shards are copied one by one, so a snapshot taken while
/// requests are flowing may be slightly stale.
pub fn snapshot(store: &CounterStore, now: DateTime<Utc>, top: usize) -> StatsSnapshot {
    let entries = store.entries();
    let total_keys = entries.len();

    let mut active: Vec<TopConsumer> = entries
        .into_iter()
        .filter(|e| now <= e.window_end)
        .map(|e| TopConsumer { key: e.key, count: e.count, window_end: e.window_end })
        .collect();
    let active_windows = active.len();

    active.sort_unstable_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    active.truncate(top);

    StatsSnapshot { total_keys, active_windows, top_consumers: active, taken_at: now }
}
