//! SourceRegistry - advertised-type lookup table.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use tracing::{debug, info, instrument, warn};

use contracts::{ContextType, Liveness, SourceAnnouncement, SourceId, SourceRecord};

/// Subscription-relevant changes produced by one announcement.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegistryDelta {
    /// (source, type) pairs advertised now but not before
    pub added: Vec<(SourceId, ContextType)>,

    /// (source, type) pairs advertised before but not now
    pub removed: Vec<(SourceId, ContextType)>,
}

impl RegistryDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Shared registry of announced sources.
///
/// `BTreeMap` keyed by source id so iteration (and therefore fan-out
/// order) is deterministic. Interior `RwLock`: announcements are rare,
/// lookups are per-request.
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<BTreeMap<SourceId, SourceRecord>>,
    /// The broker's own id; announcements under it are dropped so the
    /// broker never fans out to itself.
    own_id: Option<SourceId>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_own_id(own_id: SourceId) -> Self {
        Self {
            sources: RwLock::new(BTreeMap::new()),
            own_id: Some(own_id),
        }
    }

    /// Apply an announcement: insert a new source or replace the
    /// advertised set of an existing one.
    ///
    /// Returns the pair-level delta so the subscription manager can
    /// subscribe added pairs and drop removed ones. Announcements under
    /// the broker's own id are silently skipped.
    #[instrument(skip(self, announcement), fields(source_id = %announcement.source_id))]
    pub fn announce(&self, announcement: SourceAnnouncement) -> RegistryDelta {
        if self.own_id.as_ref() == Some(&announcement.source_id) {
            debug!("own source id skipped");
            return RegistryDelta::default();
        }

        let new_types: BTreeSet<ContextType> =
            announcement.context_types.iter().cloned().collect();

        let mut sources = match self.sources.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut delta = RegistryDelta::default();
        match sources.get_mut(&announcement.source_id) {
            Some(record) => {
                for added in new_types.difference(&record.context_types) {
                    delta
                        .added
                        .push((announcement.source_id.clone(), added.clone()));
                }
                for removed in record.context_types.difference(&new_types) {
                    delta
                        .removed
                        .push((announcement.source_id.clone(), removed.clone()));
                }
                record.context_types = new_types;
                record.announced_at = announcement.announced_at;
                debug!(
                    added = delta.added.len(),
                    removed = delta.removed.len(),
                    "source re-announced"
                );
            }
            None => {
                for ty in &new_types {
                    delta
                        .added
                        .push((announcement.source_id.clone(), ty.clone()));
                }
                let record = SourceRecord::new(
                    announcement.source_id.clone(),
                    announcement.context_types,
                    announcement.announced_at,
                );
                info!(types = record.context_types.len(), "source registered");
                sources.insert(announcement.source_id, record);
            }
        }

        metrics::gauge!("registry_sources").set(sources.len() as f64);
        delta
    }

    /// Mark a source uninstalled: its advertised set empties and its
    /// liveness flips to Unreachable, but the record stays for
    /// diagnostics.
    ///
    /// Returns the pairs that were advertised, as `removed` entries.
    /// Snapshots produced by the source are NOT purged here; callers
    /// degrade them via the store and let them expire.
    #[instrument(skip(self))]
    pub fn unregister(&self, source_id: &SourceId) -> RegistryDelta {
        let mut sources = match self.sources.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut delta = RegistryDelta::default();
        match sources.get_mut(source_id) {
            Some(record) => {
                for ty in std::mem::take(&mut record.context_types) {
                    delta.removed.push((source_id.clone(), ty));
                }
                record.liveness = Liveness::Unreachable;
                info!(removed = delta.removed.len(), "source unregistered");
            }
            None => warn!("unregister for unknown source"),
        }

        metrics::gauge!("registry_sources").set(sources.len() as f64);
        delta
    }

    /// Record the last observed reachability of a source.
    pub fn set_liveness(&self, source_id: &SourceId, liveness: Liveness) {
        let mut sources = match self.sources.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(record) = sources.get_mut(source_id) {
            if record.liveness != liveness {
                debug!(source_id = %source_id, ?liveness, "liveness changed");
            }
            record.liveness = liveness;
        }
    }

    /// Last reported liveness, `Unknown` for unregistered sources.
    pub fn liveness(&self, source_id: &SourceId) -> Liveness {
        self.read()
            .get(source_id)
            .map(|record| record.liveness)
            .unwrap_or(Liveness::Unknown)
    }

    /// Sources advertising the given type, in id order.
    pub fn sources_for(&self, context_type: &ContextType) -> Vec<SourceId> {
        self.read()
            .values()
            .filter(|record| record.supports(context_type))
            .map(|record| record.source_id.clone())
            .collect()
    }

    /// Whether any registered source advertises the type.
    pub fn supports(&self, context_type: &ContextType) -> bool {
        self.read()
            .values()
            .any(|record| record.supports(context_type))
    }

    /// Every (source, type) pair currently advertised, in order.
    pub fn all_pairs(&self) -> Vec<(SourceId, ContextType)> {
        self.read()
            .values()
            .flat_map(|record| {
                record
                    .context_types
                    .iter()
                    .map(|ty| (record.source_id.clone(), ty.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn get(&self, source_id: &SourceId) -> Option<SourceRecord> {
        self.read().get(source_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<SourceId, SourceRecord>> {
        match self.sources.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
