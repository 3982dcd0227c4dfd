//! Request metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for the request path
#[derive(Debug, Default)]
pub struct RequestMetrics {
    /// Total requests received
    request_count: AtomicU64,
    /// Requests served from a live snapshot on arrival
    fast_path_count: AtomicU64,
    /// Requests fulfilled after a fan-out round
    fulfilled_count: AtomicU64,
    /// Requests that timed out
    timeout_count: AtomicU64,
    /// Requests for unadvertised types
    unsupported_count: AtomicU64,
    /// Fulfilled replies flagged partial
    partial_count: AtomicU64,
}

impl RequestMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Get total request count
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Increment request count
    pub fn inc_request_count(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get fast path count
    pub fn fast_path_count(&self) -> u64 {
        self.fast_path_count.load(Ordering::Relaxed)
    }

    /// Increment fast path count
    pub fn inc_fast_path_count(&self) {
        self.fast_path_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get fulfilled count
    pub fn fulfilled_count(&self) -> u64 {
        self.fulfilled_count.load(Ordering::Relaxed)
    }

    /// Increment fulfilled count
    pub fn inc_fulfilled_count(&self) {
        self.fulfilled_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get timeout count
    pub fn timeout_count(&self) -> u64 {
        self.timeout_count.load(Ordering::Relaxed)
    }

    /// Increment timeout count
    pub fn inc_timeout_count(&self) {
        self.timeout_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get unsupported count
    pub fn unsupported_count(&self) -> u64 {
        self.unsupported_count.load(Ordering::Relaxed)
    }

    /// Increment unsupported count
    pub fn inc_unsupported_count(&self) {
        self.unsupported_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get partial reply count
    pub fn partial_count(&self) -> u64 {
        self.partial_count.load(Ordering::Relaxed)
    }

    /// Increment partial reply count
    pub fn inc_partial_count(&self) {
        self.partial_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> RequestMetricsSnapshot {
        RequestMetricsSnapshot {
            request_count: self.request_count(),
            fast_path_count: self.fast_path_count(),
            fulfilled_count: self.fulfilled_count(),
            timeout_count: self.timeout_count(),
            unsupported_count: self.unsupported_count(),
            partial_count: self.partial_count(),
        }
    }
}

/// Snapshot of request metrics (for reporting)
#[derive(Debug, Clone, Copy)]
pub struct RequestMetricsSnapshot {
    pub request_count: u64,
    pub fast_path_count: u64,
    pub fulfilled_count: u64,
    pub timeout_count: u64,
    pub unsupported_count: u64,
    pub partial_count: u64,
}
