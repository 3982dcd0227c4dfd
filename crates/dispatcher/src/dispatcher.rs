//! RequestDispatcher - context request state machine.
//!
//! One request walks: fast path -> support check -> subscribe + pull
//! fan-out -> bounded wait on the update bus. Cancellation is dropping
//! the request future; the fan-out tasks it spawned finish on their
//! own and their results still land in the store for later requests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use aggregator::Aggregator;
use contracts::{
    unix_now, BrokerConfig, ContextType, Liveness, RequestMeta, RequestOutcome, Snapshot,
    SnapshotReply,
};
use host_gateway::HostClient;
use ingest::IngestQueue;
use registry::SourceRegistry;
use subscriptions::SubscriptionManager;

use crate::error::DispatcherError;
use crate::metrics::RequestMetrics;

/// Progress of one pull fan-out round, shared with its tasks.
struct FanOutRound {
    total: usize,
    completed: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
}

impl FanOutRound {
    fn is_partial(&self) -> bool {
        self.failures.load(Ordering::SeqCst) > 0
            || self.completed.load(Ordering::SeqCst) < self.total
    }
}

/// Serves context requests against the snapshot store.
pub struct RequestDispatcher<H: HostClient + 'static> {
    registry: Arc<SourceRegistry>,
    subscriptions: Arc<SubscriptionManager<H>>,
    aggregator: Arc<Aggregator>,
    host: Arc<H>,
    queue: Arc<IngestQueue>,
    config: BrokerConfig,
    metrics: Arc<RequestMetrics>,
}

impl<H: HostClient + 'static> RequestDispatcher<H> {
    pub fn new(
        registry: Arc<SourceRegistry>,
        subscriptions: Arc<SubscriptionManager<H>>,
        aggregator: Arc<Aggregator>,
        host: Arc<H>,
        queue: Arc<IngestQueue>,
        config: BrokerConfig,
    ) -> Self {
        Self {
            registry,
            subscriptions,
            aggregator,
            host,
            queue,
            config,
            metrics: Arc::new(RequestMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<RequestMetrics> {
        self.metrics.clone()
    }

    /// Serve one context request.
    ///
    /// Fulfills from a live snapshot when one exists; otherwise runs a
    /// subscribe-and-pull round across every advertising source and
    /// waits up to the configured timeout for the aggregator to merge
    /// an answer.
    #[instrument(
        name = "context_request",
        skip(self),
        fields(context_type = %context_type, requester = %requester)
    )]
    pub async fn handle_context_request(
        &self,
        context_type: &ContextType,
        requester: &str,
    ) -> Result<SnapshotReply, DispatcherError> {
        let started = tokio::time::Instant::now();
        let mut meta = RequestMeta::new(context_type.clone(), requester);
        self.metrics.inc_request_count();
        metrics::counter!("requests_total").increment(1);

        // Subscribe to the update bus before reading the store so a
        // merge landing between check and wait cannot be missed
        let mut updates = self.aggregator.subscribe_updates();
        let store = self.aggregator.store();

        if let Some(snapshot) = store
            .read()
            .await
            .get_live(context_type, unix_now())
            .cloned()
        {
            meta.outcome = RequestOutcome::Fulfilled;
            meta.fast_path = true;
            meta.latency_s = started.elapsed().as_secs_f64();
            self.metrics.inc_fast_path_count();
            self.metrics.inc_fulfilled_count();
            self.log_outcome(&meta);
            return Ok(Self::build_reply(snapshot, false));
        }

        if !self.registry.supports(context_type) {
            meta.outcome = RequestOutcome::Unsupported;
            meta.latency_s = started.elapsed().as_secs_f64();
            self.metrics.inc_unsupported_count();
            self.log_outcome(&meta);
            return Err(DispatcherError::unsupported(context_type.as_str()));
        }

        let round = self.start_fan_out(context_type).await;
        meta.sources_queried = round.total;

        let deadline = started + Duration::from_secs_f64(self.config.request_timeout_s.max(0.0));
        loop {
            if let Some(snapshot) = store
                .read()
                .await
                .get_live(context_type, unix_now())
                .cloned()
            {
                meta.outcome = RequestOutcome::Fulfilled;
                meta.partial = round.is_partial();
                meta.latency_s = started.elapsed().as_secs_f64();
                self.metrics.inc_fulfilled_count();
                if meta.partial {
                    self.metrics.inc_partial_count();
                }
                self.log_outcome(&meta);
                return Ok(Self::build_reply(snapshot, meta.partial));
            }

            if tokio::time::Instant::now() >= deadline {
                break;
            }

            match tokio::time::timeout_at(deadline, updates.recv()).await {
                // Any accepted merge re-checks the store; filtering by
                // type here saves nothing since the check is one read
                Ok(Ok(_)) => continue,
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => break,
                Err(_) => break,
            }
        }

        meta.outcome = RequestOutcome::TimedOut;
        meta.partial = round.is_partial();
        meta.latency_s = started.elapsed().as_secs_f64();
        self.metrics.inc_timeout_count();
        self.log_outcome(&meta);

        Err(DispatcherError::no_context(
            context_type.as_str(),
            (meta.latency_s * 1000.0) as u64,
        ))
    }

    /// Serve a request that names a delivery profile.
    ///
    /// Profiles are accepted on the wire but not honored yet; the
    /// request is served as a plain context request.
    #[instrument(
        name = "configured_context_request",
        skip(self),
        fields(context_type = %context_type, profile = %profile)
    )]
    pub async fn handle_configured_context_request(
        &self,
        context_type: &ContextType,
        requester: &str,
        profile: &str,
    ) -> Result<SnapshotReply, DispatcherError> {
        warn!("delivery profiles are not honored; serving default configuration");
        self.handle_context_request(context_type, requester).await
    }

    /// Subscribe every advertising source and start one pull task per
    /// source. Returns immediately; tasks report through the shared
    /// counters and stage pulled events on the ingest queue.
    async fn start_fan_out(&self, context_type: &ContextType) -> FanOutRound {
        let sources = self.registry.sources_for(context_type);
        let now = unix_now();

        // Subscriptions feed the NEXT request's fast path; failures
        // are parked with backoff and do not block this round
        for source_id in &sources {
            self.subscriptions
                .ensure_subscribed(source_id, context_type, now)
                .await;
        }

        let completed = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));

        for source_id in sources.iter().cloned() {
            let host = self.host.clone();
            let queue = self.queue.clone();
            let registry = self.registry.clone();
            let aggregator = self.aggregator.clone();
            let completed = completed.clone();
            let failures = failures.clone();
            let context_type = context_type.clone();

            tokio::spawn(async move {
                match host.pull(&source_id, &context_type).await {
                    Ok(Some(event)) => {
                        registry.set_liveness(&source_id, Liveness::Reachable);
                        aggregator.set_source_degraded(&source_id, false).await;
                        // Count before staging so the merge that wakes
                        // the waiter already sees this pull finished
                        completed.fetch_add(1, Ordering::SeqCst);
                        queue.push(event);
                    }
                    Ok(None) => {
                        registry.set_liveness(&source_id, Liveness::Reachable);
                        completed.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(error) => {
                        warn!(source_id = %source_id, %error, "pull failed");
                        registry.set_liveness(&source_id, Liveness::Unreachable);
                        aggregator.set_source_degraded(&source_id, true).await;
                        failures.fetch_add(1, Ordering::SeqCst);
                        completed.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }

        FanOutRound {
            total: sources.len(),
            completed,
            failures,
        }
    }

    fn build_reply(snapshot: Snapshot, partial: bool) -> SnapshotReply {
        let age_s = snapshot.age_s(unix_now());
        SnapshotReply {
            degraded: snapshot.degraded,
            event: snapshot.event,
            partial,
            age_s,
        }
    }

    fn log_outcome(&self, meta: &RequestMeta) {
        metrics::histogram!("request_latency_seconds").record(meta.latency_s);
        info!(
            request_id = %meta.request_id,
            context_type = %meta.context_type,
            requester = %meta.requester,
            outcome = ?meta.outcome,
            latency_s = meta.latency_s,
            partial = meta.partial,
            sources_queried = meta.sources_queried,
            fast_path = meta.fast_path,
            "request finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ContextEvent, ContextListener, SourceDecl, SourceMode};
    use host_gateway::{MockHost, MockHostConfig};
    use ingest::queue_listener;
    use tokio::sync::watch;

    struct Harness {
        dispatcher: RequestDispatcher<MockHost>,
        queue: Arc<IngestQueue>,
        aggregator: Arc<Aggregator>,
        registry: Arc<SourceRegistry>,
        _shutdown: watch::Sender<bool>,
    }

    fn pull_decl(id: &str, ty: &str, payload: &str) -> SourceDecl {
        SourceDecl {
            id: id.into(),
            context_types: vec![ty.into()],
            mode: SourceMode::Pull,
            payload: Some(payload.into()),
            push_interval_ms: 60_000,
            pull_delay_ms: 0,
        }
    }

    async fn harness(decls: Vec<SourceDecl>, mock_config: MockHostConfig) -> Harness {
        let config = BrokerConfig {
            request_timeout_s: 1.0,
            sweep_interval_s: 0.05,
            ..Default::default()
        };

        let host = Arc::new(MockHost::with_config(decls, mock_config));
        host.open_session().await.unwrap();

        let queue = Arc::new(IngestQueue::new(config.queue_capacity));
        let aggregator = Arc::new(Aggregator::new(queue.clone(), config.clone()));

        let registry = Arc::new(SourceRegistry::new());
        for announcement in host.discover_sources().await.unwrap() {
            registry.announce(announcement);
        }

        let listener: ContextListener = queue_listener(queue.clone());
        let subscriptions = Arc::new(SubscriptionManager::new(
            host.clone(),
            listener,
            config.backoff,
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = aggregator.clone();
        tokio::spawn(async move { runner.run(shutdown_rx).await });

        let dispatcher = RequestDispatcher::new(
            registry.clone(),
            subscriptions,
            aggregator.clone(),
            host,
            queue.clone(),
            config,
        );

        Harness {
            dispatcher,
            queue,
            aggregator,
            registry,
            _shutdown: shutdown_tx,
        }
    }

    #[tokio::test]
    async fn test_fast_path_serves_live_snapshot() {
        let h = harness(vec![pull_decl("s1", "battery", "87%")], Default::default()).await;

        h.queue
            .push(ContextEvent::text("s1", "battery", "90%", unix_now()));
        h.aggregator.drain_and_apply().await;

        let reply = h
            .dispatcher
            .handle_context_request(&"battery".into(), "test")
            .await
            .unwrap();

        assert_eq!(reply.event.render(contracts::FORMAT_TEXT).as_deref(), Some("90%"));
        assert!(!reply.partial);

        let snapshot = h.dispatcher.metrics().snapshot();
        assert_eq!(snapshot.fast_path_count, 1);
        assert_eq!(snapshot.fulfilled_count, 1);
    }

    #[tokio::test]
    async fn test_unsupported_type_short_circuits() {
        let h = harness(vec![pull_decl("s1", "battery", "87%")], Default::default()).await;

        let result = h
            .dispatcher
            .handle_context_request(&"weather".into(), "test")
            .await;

        assert!(matches!(result, Err(DispatcherError::Unsupported { .. })));
        assert_eq!(h.dispatcher.metrics().snapshot().unsupported_count, 1);
    }

    #[tokio::test]
    async fn test_fan_out_fulfills_cold_request() {
        let h = harness(vec![pull_decl("s1", "battery", "87%")], Default::default()).await;

        let reply = h
            .dispatcher
            .handle_context_request(&"battery".into(), "test")
            .await
            .unwrap();

        assert_eq!(reply.event.render(contracts::FORMAT_TEXT).as_deref(), Some("87%"));
        assert!(!reply.partial);
        assert_eq!(h.dispatcher.metrics().snapshot().fast_path_count, 0);
    }

    #[tokio::test]
    async fn test_silent_sources_time_out() {
        let mock_config = MockHostConfig {
            silent_sources: vec!["s1".to_string()],
            ..Default::default()
        };
        let h = harness(vec![pull_decl("s1", "battery", "87%")], mock_config).await;

        let started = tokio::time::Instant::now();
        let result = h
            .dispatcher
            .handle_context_request(&"battery".into(), "test")
            .await;

        assert!(matches!(
            result,
            Err(DispatcherError::NoContextAvailable { .. })
        ));
        assert!(started.elapsed() >= Duration::from_millis(900));
        assert_eq!(h.dispatcher.metrics().snapshot().timeout_count, 1);
    }

    #[tokio::test]
    async fn test_unreachable_source_yields_partial_reply() {
        let mock_config = MockHostConfig {
            unreachable_sources: vec!["s2".to_string()],
            ..Default::default()
        };
        let h = harness(
            vec![
                pull_decl("s1", "battery", "87%"),
                pull_decl("s2", "battery", "12%"),
            ],
            mock_config,
        )
        .await;

        let reply = h
            .dispatcher
            .handle_context_request(&"battery".into(), "test")
            .await
            .unwrap();

        assert!(reply.partial);
        assert_eq!(reply.event.source_id, "s1");
        assert_eq!(h.registry.liveness(&"s2".into()), Liveness::Unreachable);
    }

    #[tokio::test]
    async fn test_configured_request_falls_back_to_default() {
        let h = harness(vec![pull_decl("s1", "battery", "87%")], Default::default()).await;

        let reply = h
            .dispatcher
            .handle_configured_context_request(&"battery".into(), "test", "fast-profile")
            .await
            .unwrap();

        assert_eq!(reply.event.render(contracts::FORMAT_TEXT).as_deref(), Some("87%"));
    }

    #[tokio::test]
    async fn test_expired_snapshot_triggers_fan_out() {
        let h = harness(vec![pull_decl("s1", "battery", "fresh")], Default::default()).await;

        // Stale event: produced long before the validity window
        h.queue
            .push(ContextEvent::text("s1", "battery", "stale", unix_now() - 120.0));
        h.aggregator.drain_and_apply().await;

        let reply = h
            .dispatcher
            .handle_context_request(&"battery".into(), "test")
            .await
            .unwrap();

        assert_eq!(
            reply.event.render(contracts::FORMAT_TEXT).as_deref(),
            Some("fresh")
        );
        assert_eq!(h.dispatcher.metrics().snapshot().fast_path_count, 0);
    }
}
