//! # Aggregator
//!
//! Single-writer merge stage: drains the ingest queue, applies
//! last-write-wins per context type, keeps the snapshot store current
//! and announces every accepted update on a broadcast bus.

mod aggregator;
mod store;

pub use aggregator::Aggregator;
pub use store::SnapshotStore;
