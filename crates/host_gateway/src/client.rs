//! Host client abstraction
//!
//! Defines the trait for talking to the host that owns the context
//! sources, supporting a mock implementation for tests and local runs.

use std::future::Future;

use contracts::{ContextEvent, ContextListener, ContextType, SourceAnnouncement, SourceId};

use crate::error::Result;

/// Host client trait
///
/// Abstracts the host's source operations so the broker above never
/// depends on a concrete host. One session per client; calls other
/// than `open_session` fail until a session is established.
pub trait HostClient: Send + Sync {
    /// Establish the host session.
    ///
    /// Idempotent: reopening an established session returns Ok.
    fn open_session(&self) -> impl Future<Output = Result<()>> + Send;

    /// Tear down the session and stop all deliveries.
    fn close_session(&self) -> impl Future<Output = Result<()>> + Send;

    /// List the sources the host currently knows, with their
    /// advertised context types.
    fn discover_sources(&self) -> impl Future<Output = Result<Vec<SourceAnnouncement>>> + Send;

    /// Subscribe to one (source, context type) pair.
    ///
    /// The listener is invoked for every event the source pushes until
    /// `unsubscribe` is called for the same pair.
    fn subscribe(
        &self,
        source_id: &SourceId,
        context_type: &ContextType,
        listener: ContextListener,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Drop the subscription for one pair.
    ///
    /// Idempotent: unsubscribing a pair that is not subscribed returns Ok.
    fn unsubscribe(
        &self,
        source_id: &SourceId,
        context_type: &ContextType,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Ask one source for its current value of a context type.
    ///
    /// `Ok(None)` means the source answered but has nothing to report;
    /// pull-only sources produce events exclusively through this call.
    fn pull(
        &self,
        source_id: &SourceId,
        context_type: &ContextType,
    ) -> impl Future<Output = Result<Option<ContextEvent>>> + Send;
}
