//! SnapshotStore - latest merged value per context type.

use std::collections::HashMap;

use contracts::{ContextEvent, ContextType, Snapshot, SourceId};

/// Per-type snapshot table.
///
/// Merge rule is last-write-wins on `produced_at`: an incoming event
/// older than the stored one is discarded, ties go to the newcomer so
/// a re-delivered value refreshes its payload. Expired snapshots are
/// flipped dead by the sweep but the record stays for diagnostics.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: HashMap<ContextType, Snapshot>,
    accepted_count: u64,
    superseded_count: u64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one event.
    ///
    /// Returns true when the event became (or refreshed) the snapshot
    /// for its type, false when an equal-or-newer snapshot won.
    pub fn apply(&mut self, event: ContextEvent, validity_window_s: f64, degraded: bool) -> bool {
        let context_type = event.context_type.clone();

        if let Some(existing) = self.snapshots.get(&context_type) {
            if event.produced_at < existing.event.produced_at {
                self.superseded_count += 1;
                return false;
            }
        }

        let expires_at = event.produced_at + validity_window_s;
        self.snapshots.insert(
            context_type,
            Snapshot {
                event,
                expires_at,
                live: true,
                degraded,
            },
        );
        self.accepted_count += 1;
        true
    }

    /// Snapshot for the type if it is still live at `now`.
    pub fn get_live(&self, context_type: &ContextType, now: f64) -> Option<&Snapshot> {
        self.snapshots
            .get(context_type)
            .filter(|snapshot| snapshot.is_live(now))
    }

    /// Snapshot record regardless of liveness.
    pub fn get(&self, context_type: &ContextType) -> Option<&Snapshot> {
        self.snapshots.get(context_type)
    }

    /// Flip the live flag on everything expired at `now`.
    ///
    /// Returns the types that just went dead.
    pub fn sweep(&mut self, now: f64) -> Vec<ContextType> {
        let mut swept = Vec::new();
        for (context_type, snapshot) in &mut self.snapshots {
            if snapshot.live && now >= snapshot.expires_at {
                snapshot.live = false;
                swept.push(context_type.clone());
            }
        }
        swept
    }

    /// Mark snapshots produced by a source as degraded (or clear the
    /// flag when the source recovers). The snapshot stays servable.
    pub fn set_source_degraded(&mut self, source_id: &SourceId, degraded: bool) -> usize {
        let mut changed = 0;
        for snapshot in self.snapshots.values_mut() {
            if snapshot.event.source_id == *source_id && snapshot.degraded != degraded {
                snapshot.degraded = degraded;
                changed += 1;
            }
        }
        changed
    }

    pub fn live_count(&self, now: f64) -> usize {
        self.snapshots
            .values()
            .filter(|snapshot| snapshot.is_live(now))
            .count()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted_count
    }

    pub fn superseded_count(&self) -> u64 {
        self.superseded_count
    }
}
