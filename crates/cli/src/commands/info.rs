//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    broker: BrokerInfo,
    sources: Vec<SourceInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    context_types: Vec<ContextTypeInfo>,
}

#[derive(Serialize)]
struct BrokerInfo {
    validity_window_s: f64,
    request_timeout_s: f64,
    queue_capacity: usize,
    sweep_interval_s: f64,
    backoff_base_s: f64,
    backoff_max_s: f64,
    session_retry_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    own_source_id: Option<String>,
}

#[derive(Serialize)]
struct SourceInfo {
    id: String,
    mode: String,
    context_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    push_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pull_delay_ms: Option<u64>,
}

#[derive(Serialize)]
struct ContextTypeInfo {
    name: String,
    providers: Vec<String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

/// Group context types with the sources that provide them
fn providers_by_type(blueprint: &contracts::BrokerBlueprint) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for source in &blueprint.sources {
        for context_type in &source.context_types {
            map.entry(context_type.to_string())
                .or_default()
                .push(source.id.to_string());
        }
    }
    map
}

fn build_config_info(blueprint: &contracts::BrokerBlueprint, args: &InfoArgs) -> ConfigInfo {
    let sources = blueprint
        .sources
        .iter()
        .map(|s| SourceInfo {
            id: s.id.to_string(),
            mode: format!("{:?}", s.mode),
            context_types: s.context_types.iter().map(|t| t.to_string()).collect(),
            push_interval_ms: (s.mode == contracts::SourceMode::Push).then_some(s.push_interval_ms),
            pull_delay_ms: (s.mode == contracts::SourceMode::Pull).then_some(s.pull_delay_ms),
        })
        .collect();

    let context_types = if args.types {
        providers_by_type(blueprint)
            .into_iter()
            .map(|(name, providers)| ContextTypeInfo { name, providers })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        broker: BrokerInfo {
            validity_window_s: blueprint.broker.validity_window_s,
            request_timeout_s: blueprint.broker.request_timeout_s,
            queue_capacity: blueprint.broker.queue_capacity,
            sweep_interval_s: blueprint.broker.sweep_interval_s,
            backoff_base_s: blueprint.broker.backoff.base_s,
            backoff_max_s: blueprint.broker.backoff.max_s,
            session_retry_s: blueprint.broker.session_retry_s,
            own_source_id: blueprint
                .broker
                .own_source_id
                .as_ref()
                .map(|id| id.to_string()),
        },
        sources,
        context_types,
    }
}

fn print_config_info(blueprint: &contracts::BrokerBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Context Broker Configuration                   ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    // Broker settings
    println!("⚙️  Broker");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!(
        "   ├─ Validity window: {}s",
        blueprint.broker.validity_window_s
    );
    println!(
        "   ├─ Request timeout: {}s",
        blueprint.broker.request_timeout_s
    );
    println!("   ├─ Queue capacity: {}", blueprint.broker.queue_capacity);
    println!(
        "   ├─ Sweep interval: {}s",
        blueprint.broker.sweep_interval_s
    );
    match &blueprint.broker.own_source_id {
        Some(own_id) => {
            println!(
                "   ├─ Backoff: base {}s, max {}s",
                blueprint.broker.backoff.base_s, blueprint.broker.backoff.max_s
            );
            println!("   └─ Own source id: {}", own_id);
        }
        None => {
            println!(
                "   └─ Backoff: base {}s, max {}s",
                blueprint.broker.backoff.base_s, blueprint.broker.backoff.max_s
            );
        }
    }

    // Sources
    println!("\n📡 Sources ({})", blueprint.sources.len());
    for (i, source) in blueprint.sources.iter().enumerate() {
        let is_last = i == blueprint.sources.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!("   {} {} ({:?})", prefix, source.id, source.mode);

        if args.sources {
            println!(
                "   {}  ├─ Context types: {:?}",
                child_prefix, source.context_types
            );
            match source.mode {
                contracts::SourceMode::Push => {
                    println!(
                        "   {}  └─ Push interval: {}ms",
                        child_prefix, source.push_interval_ms
                    );
                }
                contracts::SourceMode::Pull => {
                    println!(
                        "   {}  └─ Pull delay: {}ms",
                        child_prefix, source.pull_delay_ms
                    );
                }
            }
        } else {
            println!(
                "   {}  └─ {} context types",
                child_prefix,
                source.context_types.len()
            );
        }
    }

    // Context types grouped by provider
    if args.types {
        let grouped = providers_by_type(blueprint);
        println!("\n🗂  Context Types ({})", grouped.len());
        for (i, (context_type, providers)) in grouped.iter().enumerate() {
            let is_last = i == grouped.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            println!(
                "   {} {} <- {}",
                prefix,
                context_type,
                providers.join(", ")
            );
        }
    }

    println!();
}
