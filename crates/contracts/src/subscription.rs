//! Subscription state and retry policy.

use serde::{Deserialize, Serialize};

use crate::{ContextType, SourceId};

/// One subscription per (source, context type) pair.
pub type SubscriptionKey = (SourceId, ContextType);

/// Lifecycle of a single subscription.
///
/// Transitions are performed under the manager lock so each key holds
/// at most one in-flight subscribe attempt at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubscriptionState {
    /// Subscribe call in flight
    Pending,

    /// Host acknowledged; push events are expected
    Active,

    /// Last attempt failed; retry no earlier than `next_retry_at`
    Failed {
        attempts: u32,
        /// Unix seconds
        next_retry_at: f64,
    },
}

impl SubscriptionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionState::Active)
    }
}

/// Jittered exponential backoff for failed subscriptions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// First retry delay, seconds
    pub base_s: f64,

    /// Delay ceiling, seconds
    pub max_s: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_s: 0.5,
            max_s: 30.0,
        }
    }
}

impl BackoffPolicy {
    /// Deterministic delay component before the next attempt.
    ///
    /// `min(max, base * 2^attempts)`; the exponent is clamped so the
    /// doubling cannot overflow for pathological attempt counts. The
    /// caller scales this by +/-10 % jitter (the manager owns the RNG).
    pub fn delay_s(&self, attempts: u32) -> f64 {
        let exp = attempts.min(16);
        (self.base_s * f64::from(1u32 << exp)).min(self.max_s)
    }
}
