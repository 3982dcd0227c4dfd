//! Host Gateway error types

use thiserror::Error;

/// Host Gateway specific error
#[derive(Debug, Error)]
pub enum HostGatewayError {
    /// Session establishment error
    #[error("failed to open host session: {message}")]
    SessionFailed { message: String },

    /// Subscribe call error
    #[error("failed to subscribe '{source_id}' / '{context_type}': {message}")]
    SubscribeFailed {
        source_id: String,
        context_type: String,
        message: String,
    },

    /// Unsubscribe call error
    #[error("failed to unsubscribe '{source_id}' / '{context_type}': {message}")]
    UnsubscribeFailed {
        source_id: String,
        context_type: String,
        message: String,
    },

    /// Pull call error
    #[error("failed to pull from '{source_id}': {message}")]
    PullFailed { source_id: String, message: String },
}

impl HostGatewayError {
    /// Create session error
    pub fn session(message: impl Into<String>) -> Self {
        Self::SessionFailed {
            message: message.into(),
        }
    }

    /// Create subscribe error
    pub fn subscribe(
        source_id: impl Into<String>,
        context_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SubscribeFailed {
            source_id: source_id.into(),
            context_type: context_type.into(),
            message: message.into(),
        }
    }

    /// Create unsubscribe error
    pub fn unsubscribe(
        source_id: impl Into<String>,
        context_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::UnsubscribeFailed {
            source_id: source_id.into(),
            context_type: context_type.into(),
            message: message.into(),
        }
    }

    /// Create pull error
    pub fn pull(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PullFailed {
            source_id: source_id.into(),
            message: message.into(),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, HostGatewayError>;
