//! Broker orchestrator - coordinates all components.
//!
//! Wires the in-process mock host, registry, ingest queue, aggregator,
//! subscription manager, and request dispatcher into one running
//! broker, then drives a request loop over the configured context
//! types until the run limit is reached.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use contracts::{
    unix_now, BrokerBlueprint, ContextListener, ContextType, DecoderRegistry, RequestMeta,
    RequestOutcome, Utf8TextDecoder,
};
use dispatcher::{DispatcherError, RequestDispatcher};
use host_gateway::{ActivateAll, MockHost, SessionDriver, SourceSelectionPolicy};
use ingest::{queue_listener, IngestQueue};
use registry::SourceRegistry;
use subscriptions::SubscriptionManager;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::BrokerStats;

/// Broker runtime configuration
#[derive(Debug, Clone)]
pub struct BrokerRuntimeConfig {
    /// The broker blueprint configuration
    pub blueprint: BrokerBlueprint,

    /// Maximum number of requests to issue (None = unlimited)
    pub max_requests: Option<u64>,

    /// Run duration limit (None = run until interrupted)
    pub timeout: Option<Duration>,

    /// Interval between issued context requests
    pub request_interval: Duration,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main broker orchestrator
pub struct Broker {
    config: BrokerRuntimeConfig,
}

impl Broker {
    /// Create a new broker with the given configuration
    pub fn new(config: BrokerRuntimeConfig) -> Self {
        Self { config }
    }

    /// Run the broker to completion
    pub async fn run(self) -> Result<BrokerStats> {
        let start_time = tokio::time::Instant::now();
        let blueprint = &self.config.blueprint;
        let broker_config = blueprint.broker.to_broker_config();

        // Initialize Metrics (optional)
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Host session + source discovery
        info!(
            sources = blueprint.sources.len(),
            "Opening session against in-process mock host"
        );
        let host = Arc::new(MockHost::new(blueprint.sources.clone()));
        let session = SessionDriver::new(host.clone(), broker_config.session_retry_s);
        let announcements = session
            .establish()
            .await
            .context("Failed to establish host session")?;

        let registry = Arc::new(match broker_config.own_source_id.clone() {
            Some(own_id) => SourceRegistry::with_own_id(own_id),
            None => SourceRegistry::new(),
        });
        for announcement in announcements {
            let delta = registry.announce(announcement);
            for (source_id, context_type) in &delta.added {
                debug!(source_id = %source_id, context_type = %context_type, "pair advertised");
            }
        }
        info!(sources = registry.len(), "Source registry populated");

        let context_types = declared_context_types(blueprint);
        if context_types.is_empty() {
            warn!("No context types declared - request loop will stay idle");
        }

        // Ingest queue + aggregator task; raw host payloads are decoded
        // as text at the queue boundary
        let mut decoders = DecoderRegistry::new();
        for context_type in &context_types {
            decoders.register(context_type.clone(), Box::new(Utf8TextDecoder));
        }
        let queue = Arc::new(IngestQueue::with_decoders(
            broker_config.queue_capacity,
            Arc::new(decoders),
        ));
        let aggregator = Arc::new(aggregator::Aggregator::new(
            queue.clone(),
            broker_config.clone(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let aggregator_handle = {
            let runner = aggregator.clone();
            tokio::spawn(async move { runner.run(shutdown_rx).await })
        };

        // Subscriptions for every advertised pair
        let listener: ContextListener = queue_listener(queue.clone());
        let subscriptions = Arc::new(SubscriptionManager::new(
            host.clone(),
            listener,
            broker_config.backoff,
        ));

        let pairs = ActivateAll.select(&registry.all_pairs());
        let active = subscriptions.ensure_all(&pairs, unix_now()).await;
        info!(
            active,
            advertised = pairs.len(),
            "Initial subscriptions established"
        );

        // Dispatcher
        let request_dispatcher = RequestDispatcher::new(
            registry.clone(),
            subscriptions.clone(),
            aggregator.clone(),
            host.clone(),
            queue.clone(),
            broker_config.clone(),
        );

        info!(
            context_types = context_types.len(),
            max_requests = ?self.config.max_requests,
            interval_ms = self.config.request_interval.as_millis() as u64,
            "Broker running"
        );

        // Request loop: round-robin over declared types, with a
        // housekeeping tick for subscription retries and store gauges
        let mut stats = BrokerStats {
            sources_discovered: registry.len(),
            ..Default::default()
        };
        let deadline = self.config.timeout.map(|t| start_time + t);

        let mut request_tick = tokio::time::interval(self.config.request_interval);
        let mut housekeeping_tick = tokio::time::interval(Duration::from_secs(1));
        housekeeping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut next_type = 0usize;
        loop {
            let run_limit = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = run_limit => {
                    info!("Run duration reached");
                    break;
                }
                _ = request_tick.tick() => {
                    if context_types.is_empty() {
                        continue;
                    }
                    let context_type = &context_types[next_type % context_types.len()];
                    next_type += 1;

                    self.issue_request(&request_dispatcher, context_type, &mut stats)
                        .await;

                    if let Some(max) = self.config.max_requests {
                        if stats.requests_issued >= max {
                            info!(requests = stats.requests_issued, "Reached max requests limit");
                            break;
                        }
                    }
                }
                _ = housekeeping_tick.tick() => {
                    let retried = subscriptions.retry_due(unix_now()).await;
                    if retried > 0 {
                        debug!(retried, "Retried failed subscriptions");
                    }

                    let store = aggregator.store();
                    let guard = store.read().await;
                    observability::record_snapshot_counts(guard.live_count(unix_now()), guard.len());
                }
            }
        }

        // Shutdown: close the session first so deliveries stop, then
        // let the aggregator drain whatever is still staged
        info!("Shutting down broker...");
        if let Err(e) = session.shutdown().await {
            warn!(error = %e, "Error closing host session");
        }
        shutdown_tx.send(true).ok();
        let _ = tokio::time::timeout(Duration::from_secs(5), aggregator_handle).await;

        let dispatcher_snapshot = request_dispatcher.metrics().snapshot();
        stats.fast_path_hits = dispatcher_snapshot.fast_path_count;
        stats.active_subscriptions = subscriptions.active_count();
        stats.events_merged = aggregator.store().read().await.accepted_count();
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            fulfilled = stats.fulfilled,
            "Broker shutdown complete"
        );

        Ok(stats)
    }

    /// Issue one context request and fold the outcome into the stats.
    async fn issue_request(
        &self,
        request_dispatcher: &RequestDispatcher<MockHost>,
        context_type: &ContextType,
        stats: &mut BrokerStats,
    ) {
        let started = tokio::time::Instant::now();
        let fast_path_before = request_dispatcher.metrics().snapshot().fast_path_count;
        let result = request_dispatcher
            .handle_context_request(context_type, "cli")
            .await;

        let mut meta = RequestMeta::new(context_type.clone(), "cli");
        meta.latency_s = started.elapsed().as_secs_f64();
        // Requests go out one at a time, so a fast-path counter bump
        // here belongs to this request
        meta.fast_path =
            request_dispatcher.metrics().snapshot().fast_path_count > fast_path_before;

        stats.requests_issued += 1;

        match result {
            Ok(reply) => {
                meta.outcome = RequestOutcome::Fulfilled;
                meta.partial = reply.partial;
                stats.fulfilled += 1;
                if reply.partial {
                    stats.partial_replies += 1;
                }
                info!(
                    context_type = %context_type,
                    source_id = %reply.event.source_id,
                    age_s = format!("{:.3}", reply.age_s),
                    partial = reply.partial,
                    degraded = reply.degraded,
                    "Context reply"
                );
            }
            Err(DispatcherError::Unsupported { .. }) => {
                meta.outcome = RequestOutcome::Unsupported;
                stats.unsupported += 1;
            }
            Err(DispatcherError::NoContextAvailable { .. }) => {
                meta.outcome = RequestOutcome::TimedOut;
                stats.timed_out += 1;
                warn!(context_type = %context_type, "Request timed out");
            }
            Err(e) => {
                meta.outcome = RequestOutcome::TimedOut;
                warn!(context_type = %context_type, error = %e, "Request failed");
            }
        }

        observability::record_request_metrics(&meta);
        stats.request_stats.update(&meta);
    }
}

/// Distinct context types across all source declarations, in
/// declaration order.
fn declared_context_types(blueprint: &BrokerBlueprint) -> Vec<ContextType> {
    let mut seen = std::collections::HashSet::new();
    let mut types = Vec::new();
    for source in &blueprint.sources {
        for context_type in &source.context_types {
            if seen.insert(context_type.clone()) {
                types.push(context_type.clone());
            }
        }
    }
    types
}
