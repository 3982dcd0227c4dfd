//! Snapshot - Aggregator output
//!
//! The latest merged context value the broker will serve for a type.

use serde::{Deserialize, Serialize};

use crate::ContextEvent;

/// Current snapshot for one context type.
///
/// At most one live snapshot exists per context type. An expired
/// snapshot is logically absent: `is_live` gates every read, while the
/// record itself is retained for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Winning event under last-write-wins
    pub event: ContextEvent,

    /// Expiry instant: produced_at + validity window
    pub expires_at: f64,

    /// Flipped off by the expiry sweep; record is never deleted
    pub live: bool,

    /// Set when the producing source was reported unreachable
    pub degraded: bool,
}

impl Snapshot {
    /// Whether this snapshot may be served at `now`.
    ///
    /// Live strictly before `expires_at`; a query at exactly the expiry
    /// instant sees the snapshot as absent.
    pub fn is_live(&self, now: f64) -> bool {
        self.live && now < self.expires_at
    }

    /// Age of the underlying event at `now` (seconds, never negative).
    pub fn age_s(&self, now: f64) -> f64 {
        (now - self.event.produced_at).max(0.0)
    }
}

/// Reply to a snapshot request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotReply {
    /// The merged event being served
    pub event: ContextEvent,

    /// True when some queried source failed or had not answered when
    /// the reply was built
    pub partial: bool,

    /// True when the producing source is currently unreachable
    pub degraded: bool,

    /// Event age at serve time (seconds)
    pub age_s: f64,
}
