//! Source registry records.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{ContextType, SourceId};

/// Announcement from the host layer that a source appeared, changed
/// its advertised types, or disappeared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAnnouncement {
    pub source_id: SourceId,

    /// Full advertised set; replaces the previous set on re-announce
    pub context_types: Vec<ContextType>,

    /// Unix seconds when the host observed the change
    pub announced_at: f64,
}

/// Last reported reachability of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Liveness {
    /// Never heard from the session layer
    Unknown,
    Reachable,
    Unreachable,
}

/// One registered source and the context types it advertises.
///
/// `context_types` is a `BTreeSet` so iteration order (and therefore
/// fan-out order and log output) is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source_id: SourceId,
    pub context_types: BTreeSet<ContextType>,
    pub liveness: Liveness,

    /// Unix seconds of the most recent announcement
    pub announced_at: f64,
}

impl SourceRecord {
    pub fn new(source_id: SourceId, context_types: Vec<ContextType>, announced_at: f64) -> Self {
        Self {
            source_id,
            context_types: context_types.into_iter().collect(),
            liveness: Liveness::Unknown,
            announced_at,
        }
    }

    /// Whether this source advertises the given context type.
    pub fn supports(&self, context_type: &ContextType) -> bool {
        self.context_types.contains(context_type)
    }
}
