//! Request normalization
//!
//! Fills delivery defaults and checks the only field that must always be
//! present. Platform is left untouched; the router owns that decision.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use contracts::{CrawlRequest, DispatchError, DispatchOptions};

/// A request whose delivery counters and timestamp are guaranteed valid
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRequest {
    pub job_id: String,
    /// Non-empty, not yet resolved against the registry
    pub task_type: String,
    /// Raw platform name; empty means fan out
    pub platform: String,
    pub payload: Option<Map<String, Value>>,
    pub time_range: Option<u32>,
    /// >= 1
    pub attempt: u32,
    /// >= 1
    pub max_attempts: u32,
    pub emitted_at: DateTime<Utc>,
}

/// Normalize an inbound request
///
/// - `attempt <= 0` becomes 1
/// - `max_attempts <= 0` becomes the configured default
/// - an unset `emitted_at` becomes `now`
///
/// # Errors
/// `InvalidInput` when `task_type` is empty.
pub fn normalize(
    request: CrawlRequest,
    options: &DispatchOptions,
    now: DateTime<Utc>,
) -> Result<NormalizedRequest, DispatchError> {
    let task_type = request.task_type.trim();
    if task_type.is_empty() {
        return Err(DispatchError::invalid_input("task_type is required"));
    }

    let emitted_at = if request.emitted_at_is_unset() {
        now
    } else {
        request.emitted_at.unwrap_or(now)
    };

    Ok(NormalizedRequest {
        task_type: task_type.to_string(),
        platform: request.platform.trim().to_string(),
        attempt: positive_or(request.attempt, 1),
        max_attempts: positive_or(request.max_attempts, options.default_max_attempts()),
        job_id: request.job_id,
        payload: request.payload,
        time_range: request.time_range,
        emitted_at,
    })
}

fn positive_or(value: i32, fallback: u32) -> u32 {
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .unwrap_or(fallback)
}
