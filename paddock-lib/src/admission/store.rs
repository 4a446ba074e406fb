//! The window counter store.
//!
//! A sharded map from counter key to the key's current fixed window. Each key
//! hashes to exactly one shard, and every read-check-install-or-increment runs
//! under that shard's mutex, so updates to one key are linearizable while
//! unrelated keys rarely contend. The reaper and the stats reporter take the
//! same shard locks.

use ahash::{AHashMap, RandomState};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::clock::add_duration;
use super::hash;

/// Default shard count. Power of two is not required.
pub const DEFAULT_SHARDS: usize = 16;

/// State of one key's current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub count: u64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    fn open(now: DateTime<Utc>, length: Duration) -> Self {
        Self { count: 1, start: now, end: add_duration(now, length) }
    }

    /// Strictly after the end. A hit landing exactly on `end` still counts here.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.end
    }
}

/// A point-in-time copy of a stored counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterEntry {
    pub key: String,
    pub count: u64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

type Shard = AHashMap<String, Window>;

pub struct CounterStore {
    shards: Box<[Mutex<Shard>]>,
    hasher: RandomState,
}

impl CounterStore {
    pub fn new(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards)
                .map(|_| Mutex::new(AHashMap::new()))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
            hasher: RandomState::new(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    // A panic while holding a shard lock cannot leave a window half written
    // (every mutation is a single assignment or increment), so poisoned shards
    // are still usable.
    fn lock(shard: &Mutex<Shard>) -> MutexGuard<'_, Shard> {
        shard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn shard_for(&self, key: &str) -> &Mutex<Shard> {
        let index = (hash(key, &self.hasher) as usize)
            .checked_rem(self.shards.len())
            .unwrap_or_default();
        &self.shards[index]
    }

    /// Record one hit for `key` and return the window as it stands after the hit.
    ///
    /// Installs a fresh window when the key is unknown or its window expired
    /// before `now`; otherwise increments in place. The whole step runs under
    /// the key's shard lock.
    pub fn hit(&self, key: &str, now: DateTime<Utc>, length: Duration) -> Window {
        let mut shard = Self::lock(self.shard_for(key));
        match shard.get_mut(key) {
            Some(window) if !window.is_expired(now) => {
                window.count = window.count.saturating_add(1);
                *window
            }
            Some(window) => {
                *window = Window::open(now, length);
                *window
            }
            None => {
                let window = Window::open(now, length);
                shard.insert(key.to_string(), window);
                window
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Window> {
        Self::lock(self.shard_for(key)).get(key).copied()
    }

    /// Delete every window that ended strictly before `now`. Returns how many
    /// entries were removed.
    pub fn remove_expired(&self, now: DateTime<Utc>) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                let mut shard = Self::lock(shard);
                let before = shard.len();
                shard.retain(|_, window| !window.is_expired(now));
                before.saturating_sub(shard.len())
            })
            .sum()
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| Self::lock(shard).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy every entry out of the store, one shard at a time.
    ///
    /// Shards are not locked together, so entries from different shards may
    /// reflect slightly different instants.
    pub fn entries(&self) -> Vec<CounterEntry> {
        let mut out = Vec::new();
        for shard in self.shards.iter() {
            let shard = Self::lock(shard);
            out.extend(shard.iter().map(|(key, window)| CounterEntry {
                key: key.clone(),
                count: window.count,
                window_start: window.start,
                window_end: window.end,
            }));
        }
        out
    }

    pub fn clear(&self) {
        for shard in self.shards.iter() {
            Self::lock(shard).clear();
        }
    }
}

impl Default for CounterStore {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::clock::{Clock, ManualClock};

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_first_hit_opens_window() {
        let store = CounterStore::new(4);
        let clock = ManualClock::default();
        let now = clock.now();

        let window = store.hit("user:1:geo", now, MINUTE);
        assert_eq!(window.count, 1);
        assert_eq!(window.start, now);
        assert_eq!(window.end, add_duration(now, MINUTE));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_hits_within_window_increment() {
        let store = CounterStore::new(4);
        let clock = ManualClock::default();

        store.hit("k", clock.now(), MINUTE);
        clock.advance(Duration::from_secs(30));
        let window = store.hit("k", clock.now(), MINUTE);
        assert_eq!(window.count, 2);
    }

    #[test]
    fn test_hit_exactly_at_end_keeps_window() {
        let store = CounterStore::new(1);
        let clock = ManualClock::default();
        let first = store.hit("k", clock.now(), MINUTE);

        clock.set(first.end);
        assert_eq!(store.hit("k", clock.now(), MINUTE).count, 2);

        clock.advance(Duration::from_millis(1));
        let rolled = store.hit("k", clock.now(), MINUTE);
        assert_eq!(rolled.count, 1);
        assert_eq!(rolled.start, clock.now());
    }

    #[test]
    fn test_remove_expired_keeps_pending_windows() {
        let store = CounterStore::new(8);
        let clock = ManualClock::default();

        store.hit("old", clock.now(), Duration::from_secs(10));
        store.hit("new", clock.now(), MINUTE);
        clock.advance(Duration::from_secs(11));

        assert_eq!(store.remove_expired(clock.now()), 1);
        assert!(store.get("old").is_none());
        assert!(store.get("new").is_some());
    }

    #[test]
    fn test_zero_shards_falls_back_to_one() {
        let store = CounterStore::new(0);
        assert_eq!(store.shard_count(), 1);
        store.hit("k", Utc::now(), MINUTE);
        assert!(!store.is_empty());
        store.clear();
        assert!(store.is_empty());
    }
}
