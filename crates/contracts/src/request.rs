//! Request metadata emitted by the dispatcher.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ContextType;

/// Terminal outcome of one context request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestOutcome {
    /// A live snapshot was returned
    Fulfilled,

    /// Timed out waiting for a snapshot
    TimedOut,

    /// No registered source advertises the type
    Unsupported,
}

/// Per-request record for logging and metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMeta {
    /// Unique id for log correlation
    pub request_id: Uuid,

    pub context_type: ContextType,

    /// Caller label from the inbound surface (free-form)
    pub requester: String,

    pub outcome: RequestOutcome,

    /// Wall time from arrival to terminal state, seconds
    pub latency_s: f64,

    /// True when the reply was built before every queried source answered
    pub partial: bool,

    /// Sources the fan-out round queried (zero on the fast path)
    pub sources_queried: usize,

    /// True when a live snapshot was already present on arrival
    pub fast_path: bool,
}

impl RequestMeta {
    pub fn new(context_type: ContextType, requester: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            context_type,
            requester: requester.into(),
            outcome: RequestOutcome::TimedOut,
            latency_s: 0.0,
            partial: false,
            sources_queried: 0,
            fast_path: false,
        }
    }
}
