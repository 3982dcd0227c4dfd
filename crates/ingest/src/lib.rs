//! # Ingest
//!
//! Inbound event staging between push listeners and the aggregator.
//! Producers enqueue without ever blocking; a single consumer drains
//! in arrival order.

mod buffer;
mod metrics;
mod queue;

pub use buffer::TypeQueue;
pub use metrics::{IngestMetrics, IngestSnapshot};
pub use queue::{queue_listener, IngestQueue};
