//! `run` command implementation.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use broker::{AmqpPublisher, IngressConsumer};
use config_loader::{AppConfig, ConfigLoader};
use dispatcher::Dispatcher;

use super::redact_url;
use crate::cli::RunArgs;

/// Execute the `run` command
pub async fn run_consumer(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let mut config = ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if let Some(ref url) = args.broker_url {
        info!(url = %redact_url(url), "Overriding broker URL from CLI/env");
        config.broker.url = url.clone();
        ConfigLoader::validate(&config).context("Invalid broker URL override")?;
    }

    info!(
        broker = %redact_url(&config.broker.url),
        ingress_queue = %config.broker.ingress.queue,
        egress_exchange = %config.broker.egress.exchange,
        platforms = config.dispatch.platform_queues().len(),
        ack_policy = ?config.ack.policy,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let connection = broker::connect(&config.broker.url, &config.broker.ingress.consumer_tag)
        .await
        .context("Failed to connect to broker")?;
    let connection = Arc::new(connection);

    let consume_channel = broker::open_channel(&connection).await?;
    if args.skip_topology {
        info!("Skipping topology declaration");
    } else {
        broker::declare_topology(&consume_channel, &config.broker, &config.dispatch)
            .await
            .context("Failed to declare broker topology")?;
    }

    let egress_exchange = config.broker.egress.exchange.clone();
    let publisher = AmqpPublisher::new(Arc::clone(&connection), egress_exchange)
        .await
        .context("Failed to set up publisher")?;

    let dispatcher = Dispatcher::new(Arc::new(config.dispatch.clone()), publisher);
    let metrics = Arc::clone(dispatcher.metrics());

    let consumer = IngressConsumer::start(
        consume_channel,
        config.broker.prefetch,
        dispatcher,
        config.broker.ingress.clone(),
        config.ack.clone(),
    )
    .await
    .context("Failed to start ingress consumer")?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received shutdown signal, finishing in-flight delivery...");
        signal_token.cancel();
    });

    info!("Consuming crawl requests...");
    let stats = consumer.run(shutdown).await.context("Ingress consumer failed")?;

    if let Err(e) = connection.close(200, "shutdown").await {
        warn!(error = %e, "Broker connection close failed");
    }

    let snapshot = metrics.snapshot();
    println!("\n=== Dispatch Summary ===");
    println!("Deliveries:        {}", stats.deliveries);
    println!("Undecodable:       {}", stats.undecodable);
    println!("Dispatched:        {}", stats.dispatched);
    println!("Tasks published:   {}", snapshot.tasks_published);
    println!("Invalid input:     {}", snapshot.invalid_input);
    println!("Unknown route:     {}", snapshot.unknown_route);
    println!("Publish failures:  {}", snapshot.publish_failures);
    println!("Requeued:          {}", stats.requeued);
    println!("Latency:           {}", stats.latency.summary());

    info!("Crawl Dispatch finished");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &AppConfig) {
    let broker = &config.broker;
    println!("\n=== Configuration Summary ===\n");
    println!("Broker: {}", redact_url(&broker.url));
    println!(
        "  Ingress: {} ({}, {}) <- {} [{}]",
        broker.ingress.queue,
        broker.ingress.queue_type.as_str(),
        broker.ingress.binding_key,
        broker.ingress.exchange,
        broker.ingress.consumer_tag
    );
    println!("  Egress exchange: {}", broker.egress.exchange);
    println!("  Prefetch: {}", broker.prefetch);

    println!(
        "\nDispatch (max_attempts={}, schema_version={}):",
        config.dispatch.default_max_attempts(),
        config.dispatch.schema_version()
    );
    for (platform, routing_key) in config.dispatch.platform_queues() {
        println!("  - {platform} -> {routing_key}");
    }

    println!(
        "\nAck policy: {:?} (max_redeliveries={}, requeue_delay_ms={})",
        config.ack.policy, config.ack.max_redeliveries, config.ack.requeue_delay_ms
    );
    println!();
}
