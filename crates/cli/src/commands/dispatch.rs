//! `dispatch` command implementation.
//!
//! Runs one request through the pipeline with the log publisher, so request
//! files can be checked without a broker.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use config_loader::ConfigLoader;
use contracts::{CollectorTask, CrawlRequest, DispatchError, DispatchOptions};
use dispatcher::{Dispatcher, LogPublisher};

use crate::cli::DispatchArgs;

/// Execute the `dispatch` command
pub async fn run_dispatch(args: &DispatchArgs) -> Result<()> {
    let config = ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let body = read_request(&args.request)?;
    let request = decode(&body, args.routing_key.as_deref())?;

    info!(
        job_id = %request.job_id,
        task_type = %request.task_type,
        platform = %request.platform,
        "Dispatching request offline"
    );

    let tasks = dispatch_offline(Arc::new(config.dispatch), request)
        .await
        .context("Dispatch failed")?;

    let json = if args.compact {
        serde_json::to_string(&tasks)
    } else {
        serde_json::to_string_pretty(&tasks)
    }
    .context("Failed to serialize tasks")?;
    println!("{}", json);

    info!(tasks = tasks.len(), "Offline dispatch complete");
    Ok(())
}

fn read_request(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read request from stdin")?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("Failed to read request {}", path.display()))
}

fn decode(body: &[u8], routing_key: Option<&str>) -> Result<CrawlRequest> {
    let request = match routing_key {
        Some(key) => broker::decode_request(body, key, true),
        None => serde_json::from_slice(body),
    };
    request.context("Request is not a valid crawl request")
}

async fn dispatch_offline(
    options: Arc<DispatchOptions>,
    request: CrawlRequest,
) -> Result<Vec<CollectorTask>, DispatchError> {
    let mut dispatcher = Dispatcher::new(options, LogPublisher::new("offline"));
    let tasks = dispatcher.dispatch(request).await;
    // Log publisher close cannot fail
    let _ = dispatcher.close().await;

    let snapshot = dispatcher.snapshot();
    info!(
        requests = snapshot.requests,
        tasks_published = snapshot.tasks_published,
        failures = snapshot.failures(),
        "Offline dispatch summary"
    );
    tasks
}
