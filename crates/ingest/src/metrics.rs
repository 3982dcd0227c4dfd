//! Ingest metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for the ingest queue
#[derive(Debug, Default)]
pub struct IngestMetrics {
    /// Current total staged events across all types
    staged_len: AtomicUsize,
    /// Total events enqueued
    enqueued_count: AtomicU64,
    /// Total events dropped due to full queues
    dropped_count: AtomicU64,
    /// Total payload bytes enqueued
    payload_bytes: AtomicU64,
}

impl IngestMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current staged length
    pub fn staged_len(&self) -> usize {
        self.staged_len.load(Ordering::Relaxed)
    }

    /// Set current staged length
    pub fn set_staged_len(&self, len: usize) {
        self.staged_len.store(len, Ordering::Relaxed);
    }

    /// Get total enqueued count
    pub fn enqueued_count(&self) -> u64 {
        self.enqueued_count.load(Ordering::Relaxed)
    }

    /// Increment enqueued count
    pub fn inc_enqueued_count(&self) {
        self.enqueued_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get dropped count
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    /// Increment dropped count
    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total payload bytes
    pub fn payload_bytes(&self) -> u64 {
        self.payload_bytes.load(Ordering::Relaxed)
    }

    /// Add payload bytes
    pub fn add_payload_bytes(&self, bytes: u64) {
        self.payload_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            staged_len: self.staged_len(),
            enqueued_count: self.enqueued_count(),
            dropped_count: self.dropped_count(),
            payload_bytes: self.payload_bytes(),
        }
    }
}

/// Snapshot of ingest metrics (for reporting)
#[derive(Debug, Clone, Copy)]
pub struct IngestSnapshot {
    pub staged_len: usize,
    pub enqueued_count: u64,
    pub dropped_count: u64,
    pub payload_bytes: u64,
}
