//! Admission control for the farm API.
//!
//! Every inbound request is checked against a fixed-window counter keyed by
//! caller and endpoint category. The pieces, leaves first:
//!
//! 1. **Quota table** (`quota.rs`): `[category][role] -> QuotaConfig` plus the
//!    fallback for anonymous callers.
//!
//! 2. **Counter store** (`store.rs`): sharded map of open windows, one mutex
//!    per shard.
//!
//! 3. **Admission engine** (`limiter.rs`): atomic hit + decision.
//!
//! 4. **Key resolver** (`key.rs`) and **adaptive scaler** (`scaler.rs`).
//!
//! 5. **Priority lane and emergency override** (`priority.rs`).
//!
//! 6. **Reaper** (`reaper.rs`) and **stats** (`stats.rs`).
//!
//! # Example Usage
//!
//! ```ignore
//! use paddock_lib::admission::{AdmissionEngine, QuotaConfig};
//! use std::time::Duration;
//!
//! let engine = AdmissionEngine::with_defaults();
//! let quota = QuotaConfig::new(Duration::from_secs(60), 3)?;
//!
//! let result = engine.check_and_increment("user:42:resource_read", &quota);
//! if !result.allowed {
//!     // 429, retry after result.reset_at
//! }
//! ```

pub mod category;
pub mod clock;
pub mod events;
pub mod key;
pub mod limiter;
pub mod priority;
pub mod quota;
pub mod reaper;
pub mod scaler;
pub mod stats;
pub mod store;

pub use category::{EndpointCategory, RoleTag};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{
    AdmissionEvent, EventLevel, EventSink, EventType, RecordingEventSink, TracingEventSink,
};
pub use key::{priority_key, resolve_key, Identity};
pub use limiter::{AdmissionEngine, AdmissionResult};
pub use priority::{EmergencyOverride, PriorityLane};
pub use quota::{QuotaConfig, QuotaTable};
pub use reaper::{sweep, Reaper};
pub use scaler::{scale, LoadFactor};
pub use stats::{snapshot, StatsSnapshot, TopConsumer, TOP_CONSUMERS};
pub use store::{CounterEntry, CounterStore, Window};

use ahash::RandomState;
use std::hash::Hash;

#[inline]
fn hash<T: Hash>(key: T, hasher: &RandomState) -> u64 {
    hasher.hash_one(key)
}
