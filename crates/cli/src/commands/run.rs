//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::broker::{Broker, BrokerRuntimeConfig};
use crate::cli::RunArgs;

/// Execute the `run` command
pub async fn run_broker(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    // Validate config path
    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    // Load and parse configuration
    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(timeout_s) = args.request_timeout {
        info!(
            request_timeout_s = timeout_s,
            "Overriding request timeout from CLI"
        );
        blueprint.broker.request_timeout_s = timeout_s;
    }
    if let Some(window_s) = args.validity_window {
        info!(
            validity_window_s = window_s,
            "Overriding validity window from CLI"
        );
        blueprint.broker.validity_window_s = window_s;
    }

    info!(
        sources = blueprint.sources.len(),
        validity_window_s = blueprint.broker.validity_window_s,
        request_timeout_s = blueprint.broker.request_timeout_s,
        queue_capacity = blueprint.broker.queue_capacity,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    // Build broker runtime configuration
    let runtime_config = BrokerRuntimeConfig {
        blueprint,
        max_requests: if args.max_requests == 0 {
            None
        } else {
            Some(args.max_requests)
        },
        timeout: if args.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(args.timeout))
        },
        request_interval: Duration::from_millis(args.request_interval_ms.max(1)),
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    // Create and run broker
    let broker = Broker::new(runtime_config);

    // Setup graceful shutdown handler
    let shutdown_signal = setup_shutdown_signal();

    info!("Starting broker...");

    // Run broker with shutdown signal
    tokio::select! {
        result = broker.run() => {
            match result {
                Ok(stats) => {
                    info!(
                        requests_issued = stats.requests_issued,
                        fulfilled = stats.fulfilled,
                        timed_out = stats.timed_out,
                        duration_secs = stats.duration.as_secs_f64(),
                        fulfillment_rate = format!("{:.2}%", stats.fulfillment_rate()),
                        "Broker completed successfully"
                    );

                    // Print detailed statistics
                    stats.print_summary();
                }
                Err(e) => {
                    return Err(e).context("Broker execution failed");
                }
            }
        }
        _ = shutdown_signal => {
            warn!("Received shutdown signal, stopping broker...");
        }
    }

    info!("Context Broker finished");
    Ok(())
}

/// Setup Ctrl+C and SIGTERM signal handlers
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::BrokerBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Broker:");
    println!("  Validity window: {}s", blueprint.broker.validity_window_s);
    println!("  Request timeout: {}s", blueprint.broker.request_timeout_s);
    println!("  Queue capacity: {}", blueprint.broker.queue_capacity);
    println!(
        "  Backoff: base {}s, max {}s",
        blueprint.broker.backoff.base_s, blueprint.broker.backoff.max_s
    );
    println!("\nSources ({}):", blueprint.sources.len());
    for source in &blueprint.sources {
        println!(
            "  - {} ({:?}) - {} context types",
            source.id,
            source.mode,
            source.context_types.len()
        );
    }

    println!();
}
