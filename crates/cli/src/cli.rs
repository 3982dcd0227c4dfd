//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Context Broker - context aggregation and fan-out service
#[derive(Parser, Debug)]
#[command(
    name = "context-broker",
    author,
    version,
    about = "Context aggregation and fan-out broker",
    long_about = "A context aggregation broker that subscribes to context sources,\n\
                  merges their events into a last-write-wins snapshot store, and\n\
                  serves context requests with bounded-latency pull fan-out."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "CONTEXT_BROKER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "CONTEXT_BROKER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the broker with a request loop against the configured sources
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "CONTEXT_BROKER_CONFIG"
    )]
    pub config: PathBuf,

    /// Override request timeout from configuration (seconds)
    #[arg(long, env = "CONTEXT_BROKER_REQUEST_TIMEOUT")]
    pub request_timeout: Option<f64>,

    /// Override snapshot validity window from configuration (seconds)
    #[arg(long, env = "CONTEXT_BROKER_VALIDITY_WINDOW")]
    pub validity_window: Option<f64>,

    /// Maximum number of context requests to issue (0 = unlimited)
    #[arg(long, default_value = "0", env = "CONTEXT_BROKER_MAX_REQUESTS")]
    pub max_requests: u64,

    /// Run duration in seconds (0 = run until interrupted)
    #[arg(long, default_value = "0", env = "CONTEXT_BROKER_TIMEOUT")]
    pub timeout: u64,

    /// Interval between issued context requests in milliseconds
    #[arg(long, default_value = "1000", env = "CONTEXT_BROKER_REQUEST_INTERVAL_MS")]
    pub request_interval_ms: u64,

    /// Validate configuration and exit without running the broker
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "CONTEXT_BROKER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show detailed per-source information
    #[arg(long)]
    pub sources: bool,

    /// Show context types and their providers
    #[arg(long)]
    pub types: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
