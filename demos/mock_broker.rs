//! Mock Broker Example
//!
//! Demonstrates the full broker stack against the in-process mock
//! host. This example runs without a real host environment.
//!
//! Run with: cargo run --bin mock_broker

use std::sync::Arc;
use std::time::Duration;

use aggregator::Aggregator;
use config_loader::ConfigLoader;
use contracts::{
    unix_now, BrokerBlueprint, ContextListener, ContextType, DecoderRegistry, Utf8TextDecoder,
    FORMAT_TEXT,
};
use dispatcher::RequestDispatcher;
use host_gateway::{ActivateAll, MockHost, SessionDriver, SourceSelectionPolicy};
use ingest::{queue_listener, IngestQueue};
use registry::SourceRegistry;
use subscriptions::SubscriptionManager;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("Starting Mock Broker Demo");

    // ==== Stage 1: Use default config or load from file ====
    let blueprint = if let Some(path) = std::env::args().nth(1) {
        tracing::info!(path = %path, "Loading blueprint config");
        ConfigLoader::load_from_path(std::path::Path::new(&path))?
    } else {
        // Create a minimal test blueprint
        create_test_blueprint()
    };
    let config = blueprint.broker.to_broker_config();

    // ==== Stage 2: Open Session and Discover Sources (Mock) ====
    tracing::info!("Creating mock host...");

    let host = Arc::new(MockHost::new(blueprint.sources.clone()));
    let session = SessionDriver::new(host.clone(), config.session_retry_s);
    let announcements = session.establish().await?;

    let source_registry = Arc::new(SourceRegistry::new());
    for announcement in announcements {
        source_registry.announce(announcement);
    }
    tracing::info!(
        sources = source_registry.len(),
        "Sources discovered and registered"
    );

    // ==== Stage 3: Setup Ingest Queue and Aggregator ====
    tracing::info!("Setting up ingest queue and aggregator...");
    let mut decoders = DecoderRegistry::new();
    for source in &blueprint.sources {
        for context_type in &source.context_types {
            decoders.register(context_type.clone(), Box::new(Utf8TextDecoder));
        }
    }
    let queue = Arc::new(IngestQueue::with_decoders(
        config.queue_capacity,
        Arc::new(decoders),
    ));
    let aggregator = Arc::new(Aggregator::new(queue.clone(), config.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let aggregator_handle = {
        let runner = aggregator.clone();
        tokio::spawn(async move { runner.run(shutdown_rx).await })
    };

    // ==== Stage 4: Subscribe to Every Advertised Pair ====
    tracing::info!("Establishing subscriptions...");
    let listener: ContextListener = queue_listener(queue.clone());
    let subscriptions = Arc::new(SubscriptionManager::new(
        host.clone(),
        listener,
        config.backoff,
    ));
    let pairs = ActivateAll.select(&source_registry.all_pairs());
    let active = subscriptions.ensure_all(&pairs, unix_now()).await;
    tracing::info!(active, advertised = pairs.len(), "Subscriptions established");

    // ==== Stage 5: Serve Context Requests ====
    let request_dispatcher = RequestDispatcher::new(
        source_registry.clone(),
        subscriptions.clone(),
        aggregator.clone(),
        host.clone(),
        queue,
        config,
    );

    let context_types: Vec<ContextType> = blueprint
        .sources
        .iter()
        .flat_map(|s| s.context_types.iter().cloned())
        .collect();

    let target_requests = 20usize;
    tracing::info!("Issuing {} context requests...", target_requests);

    for i in 0..target_requests {
        let context_type = &context_types[i % context_types.len()];
        match request_dispatcher
            .handle_context_request(context_type, "demo")
            .await
        {
            Ok(reply) => tracing::info!(
                context_type = %context_type,
                source_id = %reply.event.source_id,
                value = ?reply.event.render(FORMAT_TEXT),
                age_s = format!("{:.3}", reply.age_s),
                partial = reply.partial,
                "Context reply"
            ),
            Err(e) => tracing::warn!(context_type = %context_type, error = %e, "Request failed"),
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    // ==== Stage 6: Cleanup ====
    tracing::info!("Shutting down and cleaning up...");
    session.shutdown().await?;
    shutdown_tx.send(true)?;
    let _ = tokio::time::timeout(Duration::from_secs(5), aggregator_handle).await;

    let summary = request_dispatcher.metrics().snapshot();
    tracing::info!(
        requests = summary.request_count,
        fulfilled = summary.fulfilled_count,
        fast_path = summary.fast_path_count,
        "Demo completed"
    );

    Ok(())
}

fn create_test_blueprint() -> BrokerBlueprint {
    use contracts::{BrokerSettings, ConfigVersion, SourceDecl, SourceMode};

    BrokerBlueprint {
        version: ConfigVersion::V1,
        broker: BrokerSettings {
            validity_window_s: 10.0,
            request_timeout_s: 2.0,
            ..Default::default()
        },
        sources: vec![
            SourceDecl {
                id: "battery_monitor".into(),
                context_types: vec!["battery".into()],
                mode: SourceMode::Push,
                payload: Some("87%".into()),
                push_interval_ms: 500,
                pull_delay_ms: 0,
            },
            SourceDecl {
                id: "location_provider".into(),
                context_types: vec!["location".into()],
                mode: SourceMode::Pull,
                payload: Some("52.5200,13.4050".into()),
                push_interval_ms: 1000,
                pull_delay_ms: 20,
            },
        ],
    }
}
