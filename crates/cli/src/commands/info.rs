//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use config_loader::{AppConfig, ConfigLoader};
use contracts::registry::SCHEMA_REGISTRY;
use contracts::{AckPolicy, Platform, QueueType, TaskType};

use super::redact_url;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    broker: BrokerInfo,
    dispatch: DispatchInfo,
    routes: Vec<RouteInfo>,
    ack: AckInfo,
}

#[derive(Serialize)]
struct BrokerInfo {
    url: String,
    prefetch: u16,
    ingress_exchange: String,
    ingress_queue: String,
    binding_key: String,
    ingress_queue_type: QueueType,
    egress_exchange: String,
    declare_platform_queues: bool,
}

#[derive(Serialize)]
struct DispatchInfo {
    default_max_attempts: u32,
    schema_version: u32,
}

#[derive(Serialize)]
struct RouteInfo {
    platform: Platform,
    routing_key: String,
    task_types: Vec<TaskTypeInfo>,
}

#[derive(Serialize)]
struct TaskTypeInfo {
    task_type: TaskType,
    dry_run: bool,
}

#[derive(Serialize)]
struct AckInfo {
    policy: AckPolicy,
    max_redeliveries: u32,
    requeue_delay_ms: u64,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&config);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(config: &AppConfig) -> ConfigInfo {
    let broker = &config.broker;
    let routes = config
        .dispatch
        .platform_queues()
        .iter()
        .map(|(platform, routing_key)| RouteInfo {
            platform: *platform,
            routing_key: routing_key.clone(),
            task_types: SCHEMA_REGISTRY
                .iter()
                .filter(|entry| entry.platform == *platform)
                .map(|entry| TaskTypeInfo {
                    task_type: entry.task_type,
                    dry_run: entry.dry_run,
                })
                .collect(),
        })
        .collect();

    ConfigInfo {
        version: format!("{:?}", config.version),
        broker: BrokerInfo {
            url: redact_url(&broker.url),
            prefetch: broker.prefetch,
            ingress_exchange: broker.ingress.exchange.clone(),
            ingress_queue: broker.ingress.queue.clone(),
            binding_key: broker.ingress.binding_key.clone(),
            ingress_queue_type: broker.ingress.queue_type,
            egress_exchange: broker.egress.exchange.clone(),
            declare_platform_queues: broker.declare_platform_queues,
        },
        dispatch: DispatchInfo {
            default_max_attempts: config.dispatch.default_max_attempts(),
            schema_version: config.dispatch.schema_version(),
        },
        routes,
        ack: AckInfo {
            policy: config.ack.policy,
            max_redeliveries: config.ack.max_redeliveries,
            requeue_delay_ms: config.ack.requeue_delay_ms,
        },
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("\n=== Crawl Dispatch Configuration ===\n");
    println!("Version: {}", info.version);

    println!("\nBroker:");
    println!("  URL: {}", info.broker.url);
    println!("  Prefetch: {}", info.broker.prefetch);
    println!(
        "  Ingress: {} --[{}]--> {} ({})",
        info.broker.ingress_exchange,
        info.broker.binding_key,
        info.broker.ingress_queue,
        info.broker.ingress_queue_type.as_str()
    );
    println!("  Egress exchange: {}", info.broker.egress_exchange);
    println!(
        "  Declare platform queues: {}",
        info.broker.declare_platform_queues
    );

    println!("\nDispatch:");
    println!("  Default max attempts: {}", info.dispatch.default_max_attempts);
    println!("  Schema version: {}", info.dispatch.schema_version);

    println!("\nRoutes ({}):", info.routes.len());
    for route in &info.routes {
        println!("  {} -> {}", route.platform, route.routing_key);
        for task_type in &route.task_types {
            let marker = if task_type.dry_run { " (dry run)" } else { "" };
            println!("    - {}{}", task_type.task_type, marker);
        }
    }

    println!("\nAck:");
    println!("  Policy: {:?}", info.ack.policy);
    println!("  Max redeliveries: {}", info.ack.max_redeliveries);
    println!("  Requeue delay: {} ms", info.ack.requeue_delay_ms);
    println!();
}
