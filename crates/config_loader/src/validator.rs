//! 配置校验模块
//!
//! 校验规则：
//! - 字段级约束 (`validator` derive)：url / exchange / queue 非空，prefetch >= 1
//! - ingress 与 egress exchange 不能相同
//! - ingress queue 不能与任何平台路由键重名
//! - 平台路由键不能重复

use std::collections::HashSet;

use contracts::{AppConfig, ContractError};
use ::validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

/// 校验 AppConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &AppConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_exchanges(config)?;
    validate_queue_names(config)?;
    Ok(())
}

/// 字段级约束
fn validate_fields(config: &AppConfig) -> Result<(), ContractError> {
    match config.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let (field, message) = first_error("", &errors)
                .unwrap_or_else(|| ("config".to_string(), errors.to_string()));
            Err(ContractError::config_validation(field, message))
        }
    }
}

/// 按字段路径排序后取第一个错误，保证报错稳定
fn first_error(prefix: &str, errors: &ValidationErrors) -> Option<(String, String)> {
    let mut entries: Vec<_> = errors.errors().iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (name, kind) in entries {
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                if let Some(err) = list.first() {
                    let message = match &err.message {
                        Some(msg) => msg.to_string(),
                        None => describe(err),
                    };
                    return Some((path, message));
                }
            }
            ValidationErrorsKind::Struct(inner) => {
                if let Some(found) = first_error(&path, inner) {
                    return Some(found);
                }
            }
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    if let Some(found) = first_error(&format!("{path}[{idx}]"), inner) {
                        return Some(found);
                    }
                }
            }
        }
    }
    None
}

fn describe(err: &ValidationError) -> String {
    match err.code.as_ref() {
        "length" => "cannot be empty".to_string(),
        "range" => {
            let bound = |key: &str| err.params.get(key).map(|v| v.to_string());
            match (bound("min"), bound("max")) {
                (Some(min), Some(max)) => format!("must be within {min}..={max}"),
                (Some(min), None) => format!("must be >= {min}"),
                (None, Some(max)) => format!("must be <= {max}"),
                (None, None) => "out of range".to_string(),
            }
        }
        code => format!("failed '{code}' check"),
    }
}

/// 入站与出站 exchange 必须分离，否则发布的任务会被自己再次消费
fn validate_exchanges(config: &AppConfig) -> Result<(), ContractError> {
    let broker = &config.broker;
    if broker.ingress.exchange == broker.egress.exchange {
        return Err(ContractError::config_validation(
            "broker.egress.exchange",
            format!(
                "must differ from broker.ingress.exchange ('{}')",
                broker.ingress.exchange
            ),
        ));
    }
    Ok(())
}

/// 校验队列命名冲突
fn validate_queue_names(config: &AppConfig) -> Result<(), ContractError> {
    let ingress_queue = config.broker.ingress.queue.as_str();
    let mut seen = HashSet::new();

    for (platform, routing_key) in config.dispatch.platform_queues() {
        if routing_key == ingress_queue {
            return Err(ContractError::config_validation(
                format!("dispatch.platform_queues.{platform}"),
                format!("routing key collides with ingress queue '{ingress_queue}'"),
            ));
        }
        if !seen.insert(routing_key.as_str()) {
            return Err(ContractError::config_validation(
                format!("dispatch.platform_queues.{platform}"),
                format!("duplicate routing key '{routing_key}'"),
            ));
        }
    }
    Ok(())
}
