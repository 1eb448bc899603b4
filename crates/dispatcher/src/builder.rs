//! Task assembly

use serde_json::Value;
use std::collections::BTreeMap;

use contracts::{CollectorTask, DispatchOptions, SCHEMA_VERSION_HEADER, TaskPayload, TaskType};

use crate::normalizer::NormalizedRequest;
use crate::router::Route;

/// Build the outbound task for one route
pub fn build_task(
    request: &NormalizedRequest,
    route: &Route,
    task_type: TaskType,
    payload: TaskPayload,
    options: &DispatchOptions,
) -> CollectorTask {
    let schema_version = options.schema_version();
    let mut headers = BTreeMap::new();
    headers.insert(
        SCHEMA_VERSION_HEADER.to_string(),
        Value::from(schema_version),
    );

    CollectorTask {
        job_id: request.job_id.clone(),
        platform: route.platform,
        task_type,
        payload,
        time_range: request.time_range,
        attempt: request.attempt,
        max_attempts: request.max_attempts,
        schema_version,
        routing_key: route.routing_key.clone(),
        emitted_at: request.emitted_at,
        headers,
    }
}
