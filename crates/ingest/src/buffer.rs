//! Per-type event queue with arrival-order FIFO semantics.
//!
//! Uses index-based separation for better performance:
//! - HeapRb stores lightweight metadata (produced_at + slab key)
//! - Slab stores actual ContextEvent data
//!
//! This avoids moving payloads during queue operations.

use contracts::ContextEvent;
use ringbuf::{traits::*, HeapRb};
use slab::Slab;
use std::fmt;

/// Lightweight metadata stored in ring buffer
#[derive(Debug, Clone, Copy)]
struct EventMeta {
    /// Production timestamp (for out-of-order accounting)
    produced_at: f64,
    /// Key into the slab storage
    slab_key: usize,
}

/// Per-context-type FIFO queue
///
/// Arrival order, not timestamp order: the merge step downstream
/// resolves ordering by `produced_at`, the queue only stages events.
/// When full, the oldest staged event is dropped so producers never
/// block on a slow consumer.
pub struct TypeQueue {
    /// Ring buffer of metadata (produced_at + slab key)
    index: HeapRb<EventMeta>,
    /// Actual event storage
    storage: Slab<ContextEvent>,
    capacity: usize,
    dropped_count: u64,
    out_of_order_count: u64,
    last_produced_at: Option<f64>,
}

impl fmt::Debug for TypeQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeQueue")
            .field("len", &self.index.occupied_len())
            .field("capacity", &self.capacity)
            .field("dropped", &self.dropped_count)
            .finish()
    }
}

impl TypeQueue {
    /// Create a new queue with the given capacity
    #[inline]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            index: HeapRb::new(capacity),
            storage: Slab::with_capacity(capacity),
            capacity,
            dropped_count: 0,
            out_of_order_count: 0,
            last_produced_at: None,
        }
    }

    /// Push an event into the queue
    ///
    /// If the queue is full, drops the oldest staged event.
    /// Returns true when an old event was dropped to make room.
    #[inline]
    pub fn push(&mut self, event: ContextEvent) -> bool {
        let produced_at = event.produced_at;

        // Track out-of-order arrivals
        if let Some(last) = self.last_produced_at {
            if produced_at < last {
                self.out_of_order_count += 1;
            }
        }
        self.last_produced_at = Some(produced_at);

        // If full, remove oldest entry from both index and storage
        let mut dropped = false;
        if self.index.is_full() {
            if let Some(old_meta) = self.index.try_pop() {
                self.storage.remove(old_meta.slab_key);
            }
            self.dropped_count += 1;
            dropped = true;
        }

        let slab_key = self.storage.insert(event);
        let meta = EventMeta {
            produced_at,
            slab_key,
        };
        let _ = self.index.try_push(meta);
        dropped
    }

    /// Remove and return the oldest staged event (arrival order)
    #[inline]
    pub fn pop(&mut self) -> Option<ContextEvent> {
        let meta = self.index.try_pop()?;
        Some(self.storage.remove(meta.slab_key))
    }

    /// Get the number of staged events
    #[inline]
    pub fn len(&self) -> usize {
        self.index.occupied_len()
    }

    /// Check if the queue is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Get dropped event count
    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    /// Get out-of-order arrival count
    #[inline]
    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_event(produced_at: f64) -> ContextEvent {
        ContextEvent::text("s1", "battery", "87%", produced_at)
    }

    #[test]
    fn test_fifo_arrival_order() {
        let mut queue = TypeQueue::new(10);

        queue.push(make_event(3.0));
        queue.push(make_event(1.0));
        queue.push(make_event(2.0));

        // Pop returns arrival order, not timestamp order
        assert_eq!(queue.pop().unwrap().produced_at, 3.0);
        assert_eq!(queue.pop().unwrap().produced_at, 1.0);
        assert_eq!(queue.pop().unwrap().produced_at, 2.0);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_drop_oldest_at_capacity() {
        let mut queue = TypeQueue::new(3);

        assert!(!queue.push(make_event(1.0)));
        assert!(!queue.push(make_event(2.0)));
        assert!(!queue.push(make_event(3.0)));
        assert!(queue.push(make_event(4.0))); // Evicts 1.0

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(queue.pop().unwrap().produced_at, 2.0);
    }

    #[test]
    fn test_out_of_order_detection() {
        let mut queue = TypeQueue::new(10);

        queue.push(make_event(1.0));
        queue.push(make_event(3.0));
        queue.push(make_event(2.0)); // Out of order

        assert_eq!(queue.out_of_order_count(), 1);
    }

    #[test]
    fn test_zero_capacity_clamps_to_one() {
        let mut queue = TypeQueue::new(0);
        queue.push(make_event(1.0));
        assert_eq!(queue.len(), 1);
    }
}
