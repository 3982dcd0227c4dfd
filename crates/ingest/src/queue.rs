//! IngestQueue - staging area between producers and the aggregator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tracing::trace;

use contracts::{ContextEvent, ContextListener, ContextType, DecoderRegistry};

use crate::buffer::TypeQueue;
use crate::metrics::IngestMetrics;

/// Shared inbound queue, one FIFO per context type.
///
/// `push` is synchronous and never blocks on the consumer: a full
/// per-type queue drops its oldest event instead. The aggregator waits
/// on the notify handle and drains everything staged. Raw payloads are
/// upgraded by the decoder table (when one is attached) before they
/// are staged, so every path into the store sees typed events.
pub struct IngestQueue {
    queues: Mutex<HashMap<ContextType, TypeQueue>>,
    notify: Notify,
    metrics: IngestMetrics,
    per_type_capacity: usize,
    decoders: Option<Arc<DecoderRegistry>>,
}

impl IngestQueue {
    pub fn new(per_type_capacity: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            metrics: IngestMetrics::new(),
            per_type_capacity,
            decoders: None,
        }
    }

    /// Route raw payloads through a decoder table before staging.
    pub fn with_decoders(per_type_capacity: usize, decoders: Arc<DecoderRegistry>) -> Self {
        Self {
            decoders: Some(decoders),
            ..Self::new(per_type_capacity)
        }
    }

    /// Stage one event. Never blocks; drops the oldest event of the
    /// same type when that type's queue is full.
    pub fn push(&self, event: ContextEvent) {
        let event = match &self.decoders {
            Some(decoders) => decoders.upgrade(event),
            None => event,
        };
        trace!(source_id = %event.source_id, context_type = %event.context_type, "event staged");

        self.metrics.inc_enqueued_count();
        self.metrics.add_payload_bytes(event.payload.len() as u64);
        metrics::counter!("ingest_events_total").increment(1);

        let mut queues = self.lock();
        let queue = queues
            .entry(event.context_type.clone())
            .or_insert_with(|| TypeQueue::new(self.per_type_capacity));

        if queue.push(event) {
            self.metrics.inc_dropped_count();
            metrics::counter!("ingest_events_dropped_total").increment(1);
        }

        let staged: usize = queues.values().map(TypeQueue::len).sum();
        self.metrics.set_staged_len(staged);
        drop(queues);

        self.notify.notify_one();
    }

    /// Remove and return everything currently staged.
    ///
    /// Per-type arrival order is preserved; order across types is not
    /// meaningful (the merge step orders by `produced_at`).
    pub fn drain(&self) -> Vec<ContextEvent> {
        let mut queues = self.lock();
        let mut drained = Vec::new();
        for queue in queues.values_mut() {
            while let Some(event) = queue.pop() {
                drained.push(event);
            }
        }
        self.metrics.set_staged_len(0);
        drained
    }

    /// Wait until at least one event has been staged since the last
    /// drain.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }

    pub fn staged_len(&self) -> usize {
        self.lock().values().map(TypeQueue::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.staged_len() == 0
    }

    pub fn metrics(&self) -> &IngestMetrics {
        &self.metrics
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ContextType, TypeQueue>> {
        match self.queues.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Build a push listener that stages everything into the queue.
pub fn queue_listener(queue: Arc<IngestQueue>) -> ContextListener {
    Arc::new(move |event| queue.push(event))
}
