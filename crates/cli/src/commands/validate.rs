//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use config_loader::{AppConfig, ConfigLoader};
use contracts::{AckPolicy, Platform, QueueType};

use super::redact_url;
use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    broker: String,
    platform_count: usize,
    default_max_attempts: u32,
    schema_version: u32,
    ack_policy: AckPolicy,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    broker: redact_url(&config.broker.url),
                    platform_count: config.dispatch.platform_queues().len(),
                    default_max_attempts: config.dispatch.default_max_attempts(),
                    schema_version: config.dispatch.schema_version(),
                    ack_policy: config.ack.policy,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    for platform in Platform::ALL {
        if config.dispatch.routing_key(platform).is_none() {
            warnings.push(format!(
                "No queue for platform '{platform}' - requests naming it will be dropped"
            ));
        }
    }

    if config.ack.policy == AckPolicy::Always {
        warnings.push(
            "ack.policy = \"always\" - transient publish failures drop the request".to_string(),
        );
    }

    if config.ack.policy == AckPolicy::RequeueTransient
        && config.broker.ingress.queue_type == QueueType::Classic
    {
        warnings.push(
            "broker.ingress.queue_type = \"classic\" - redeliveries are only counted per process"
                .to_string(),
        );
    }

    if config.broker.prefetch > 1 {
        warnings.push(format!(
            "broker.prefetch = {} - deliveries beyond the first wait unacked in the client",
            config.broker.prefetch
        ));
    }

    if !config.broker.declare_platform_queues {
        warnings.push(
            "broker.declare_platform_queues = false - platform queues must already exist"
                .to_string(),
        );
    }

    if !config.broker.ingress.backfill_from_routing_key {
        warnings.push(
            "Routing key backfill disabled - requests must carry task_type in the body".to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Broker: {}", summary.broker);
            println!("  Platforms: {}", summary.platform_count);
            println!("  Default max attempts: {}", summary.default_max_attempts);
            println!("  Schema version: {}", summary.schema_version);
            println!("  Ack policy: {:?}", summary.ack_policy);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
