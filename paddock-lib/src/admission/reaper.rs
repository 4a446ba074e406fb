//! Background sweep that bounds the counter store's memory.
//!
//! Without it the store keeps one entry per (identity, category) pair ever
//! seen. The sweep takes the same shard locks as the request path.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::store::CounterStore;
use crate::telemetry::Metrics;

/// Handle to a running reaper task.
pub struct Reaper {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Spawn the sweep loop on the current tokio runtime.
    pub fn start(
        store: Arc<CounterStore>,
        clock: Arc<dyn Clock>,
        every: Duration,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let every = every.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            info!(interval_ms = every.as_millis() as u64, "Counter reaper started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = sweep(&store, clock.as_ref());
                        let remaining = store.len();
                        if removed > 0 {
                            debug!(removed, remaining, "Reaped expired counters");
                        }
                        if let Some(m) = &metrics {
                            m.record_reaped(removed as u64);
                            m.record_store_size(remaining as u64);
                        }
                    }
                }
            }
            info!("Counter reaper stopped");
        });

        Self { cancel, handle: Some(handle) }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop to exit and wait for it.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Counter reaper task ended abnormally");
            }
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// One sweep: remove every entry whose window ended before the clock's now.
pub fn sweep(store: &CounterStore, clock: &dyn Clock) -> usize {
    store.remove_expired(clock.now())
}
