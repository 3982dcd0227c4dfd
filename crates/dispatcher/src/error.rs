//! Dispatcher error types

use thiserror::Error;

/// Dispatcher specific error
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// No registered source advertises the requested type
    #[error("unsupported context type: {context_type}")]
    Unsupported { context_type: String },

    /// Bounded wait expired without a live snapshot
    #[error("no context available for '{context_type}' after {waited_ms}ms")]
    NoContextAvailable {
        context_type: String,
        waited_ms: u64,
    },
}

impl DispatcherError {
    /// Create unsupported type error
    pub fn unsupported(context_type: impl Into<String>) -> Self {
        Self::Unsupported {
            context_type: context_type.into(),
        }
    }

    /// Create no-context error
    pub fn no_context(context_type: impl Into<String>, waited_ms: u64) -> Self {
        Self::NoContextAvailable {
            context_type: context_type.into(),
            waited_ms,
        }
    }
}
