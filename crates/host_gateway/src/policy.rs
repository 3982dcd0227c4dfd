//! Source selection policy.
//!
//! Decides which advertised (source, type) pairs get a subscription.
//! The default subscribes to everything so every request after the
//! first can be served from the snapshot store.

use contracts::{ContextType, SourceId};

/// Filter advertised pairs down to the set worth subscribing.
pub trait SourceSelectionPolicy: Send + Sync {
    fn select(&self, pairs: &[(SourceId, ContextType)]) -> Vec<(SourceId, ContextType)>;
}

/// Subscribe to every advertised pair.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActivateAll;

impl SourceSelectionPolicy for ActivateAll {
    fn select(&self, pairs: &[(SourceId, ContextType)]) -> Vec<(SourceId, ContextType)> {
        pairs.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activate_all_keeps_everything() {
        let pairs: Vec<(SourceId, ContextType)> = vec![
            ("s1".into(), "battery".into()),
            ("s2".into(), "location".into()),
        ];
        assert_eq!(ActivateAll.select(&pairs), pairs);
    }
}
