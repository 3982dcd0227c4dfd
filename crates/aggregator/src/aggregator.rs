//! Aggregator task: ingest queue -> snapshot store -> update bus.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch, RwLock};
use tracing::{debug, info, instrument};

use contracts::{unix_now, BrokerConfig, ContextType, SourceId};
use ingest::IngestQueue;

use crate::store::SnapshotStore;

/// Capacity of the update broadcast bus. Receivers that lag this far
/// behind miss wakeups and fall back to their timeout.
const UPDATE_BUS_CAPACITY: usize = 256;

/// Owns the snapshot store and is its only writer.
///
/// Readers go through `store()` (shared `RwLock`); waiters subscribe
/// to the update bus and get the context type of every accepted merge.
pub struct Aggregator {
    queue: Arc<IngestQueue>,
    store: Arc<RwLock<SnapshotStore>>,
    updates: broadcast::Sender<ContextType>,
    config: BrokerConfig,
}

impl Aggregator {
    pub fn new(queue: Arc<IngestQueue>, config: BrokerConfig) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_BUS_CAPACITY);
        Self {
            queue,
            store: Arc::new(RwLock::new(SnapshotStore::new())),
            updates,
            config,
        }
    }

    /// Shared read handle to the snapshot store.
    pub fn store(&self) -> Arc<RwLock<SnapshotStore>> {
        self.store.clone()
    }

    /// Subscribe to accepted-merge notifications.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<ContextType> {
        self.updates.subscribe()
    }

    /// Mark every snapshot from a source as degraded or recovered.
    pub async fn set_source_degraded(&self, source_id: &SourceId, degraded: bool) {
        let changed = self
            .store
            .write()
            .await
            .set_source_degraded(source_id, degraded);
        if changed > 0 {
            debug!(source_id = %source_id, degraded, changed, "degraded flag updated");
        }
    }

    /// Drain the queue once and merge everything staged.
    ///
    /// Returns the number of accepted merges. Exposed for deterministic
    /// tests; `run` calls this on every wakeup.
    pub async fn drain_and_apply(&self) -> usize {
        let drained = self.queue.drain();
        if drained.is_empty() {
            return 0;
        }

        let mut accepted = 0;
        let mut store = self.store.write().await;
        for event in drained {
            let context_type = event.context_type.clone();
            if store.apply(event, self.config.validity_window_s, false) {
                accepted += 1;
                metrics::counter!("aggregator_merges_total").increment(1);
                // No receivers is fine; nobody is waiting right now
                let _ = self.updates.send(context_type);
            } else {
                metrics::counter!("aggregator_superseded_total").increment(1);
            }
        }
        accepted
    }

    /// Flip expired snapshots dead.
    pub async fn sweep(&self, now: f64) -> Vec<ContextType> {
        let swept = self.store.write().await.sweep(now);
        for context_type in &swept {
            debug!(context_type = %context_type, "snapshot expired");
            metrics::counter!("aggregator_expired_total").increment(1);
        }
        swept
    }

    /// Run until the shutdown flag flips.
    ///
    /// Single consumer loop: wake on staged events, merge, and sweep
    /// expiries on a fixed tick. A final drain runs on shutdown so
    /// nothing staged is lost.
    #[instrument(name = "aggregator_run", skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut sweep_tick =
            tokio::time::interval(Duration::from_secs_f64(self.config.sweep_interval_s.max(0.01)));
        sweep_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            validity_window_s = self.config.validity_window_s,
            sweep_interval_s = self.config.sweep_interval_s,
            "aggregator started"
        );

        loop {
            tokio::select! {
                _ = self.queue.wait() => {
                    self.drain_and_apply().await;
                }
                _ = sweep_tick.tick() => {
                    self.sweep(unix_now()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let remaining = self.drain_and_apply().await;
        info!(remaining, "aggregator stopped");
    }
}
