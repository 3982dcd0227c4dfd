//! # Dispatcher
//!
//! Serves context requests: fast path from the snapshot store, or a
//! subscribe-and-pull fan-out round followed by a bounded wait on the
//! aggregator's update bus.

mod dispatcher;
mod error;
mod metrics;

pub use dispatcher::RequestDispatcher;
pub use error::DispatcherError;
pub use metrics::{RequestMetrics, RequestMetricsSnapshot};
