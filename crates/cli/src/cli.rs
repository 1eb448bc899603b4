//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Crawl Dispatch - routes crawl requests to platform collector queues
#[derive(Parser, Debug)]
#[command(
    name = "crawl-dispatch",
    author,
    version,
    about = "Crawl-task dispatch service",
    long_about = "Consumes generic crawl requests from RabbitMQ, resolves the target platform(s),\n\
                  converts the untyped payload into the platform task schema and publishes\n\
                  one task per platform collector queue."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        global = true,
        env = "CRAWL_DISPATCH_VERBOSE"
    )]
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
        env = "CRAWL_DISPATCH_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to the broker and dispatch requests until stopped
    Run(RunArgs),

    /// Validate configuration file without connecting
    Validate(ValidateArgs),

    /// Display routing table and broker topology
    Info(InfoArgs),

    /// Dispatch a single request file offline and print the resulting tasks
    Dispatch(DispatchArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config/crawl-dispatch.toml",
        env = "CRAWL_DISPATCH_CONFIG"
    )]
    pub config: PathBuf,

    /// Override the broker URL from configuration
    #[arg(long, env = "RABBITMQ_URL", hide_env_values = true)]
    pub broker_url: Option<String>,

    /// Skip exchange/queue declaration (topology managed elsewhere)
    #[arg(long)]
    pub skip_topology: bool,

    /// Validate configuration and exit without connecting
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "CRAWL_DISPATCH_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(
        short,
        long,
        default_value = "config/crawl-dispatch.toml",
        env = "CRAWL_DISPATCH_CONFIG"
    )]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "config/crawl-dispatch.toml",
        env = "CRAWL_DISPATCH_CONFIG"
    )]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `dispatch` command
#[derive(Parser, Debug)]
pub struct DispatchArgs {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "config/crawl-dispatch.toml",
        env = "CRAWL_DISPATCH_CONFIG"
    )]
    pub config: PathBuf,

    /// Request JSON file ("-" reads stdin)
    pub request: PathBuf,

    /// Ingress routing key to simulate (enables platform/task type backfill)
    #[arg(long)]
    pub routing_key: Option<String>,

    /// Print tasks as compact single-line JSON
    #[arg(long)]
    pub compact: bool,
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
