//! CollectorTask - outbound message, one per target platform

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{Platform, TaskPayload, TaskType};

/// Header carrying the payload schema version
pub const SCHEMA_VERSION_HEADER: &str = "x-schema-version";

/// Strongly-typed task routed to a platform worker queue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectorTask {
    pub job_id: String,
    pub platform: Platform,
    pub task_type: TaskType,
    pub payload: TaskPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<u32>,
    /// Always >= 1
    pub attempt: u32,
    /// Always >= 1
    pub max_attempts: u32,
    pub schema_version: u32,
    /// Broker routing key of the platform queue
    pub routing_key: String,
    pub emitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Value>,
}

impl CollectorTask {
    /// Stable per-task message id (`<job_id>:<platform>`)
    pub fn message_id(&self) -> String {
        format!("{}:{}", self.job_id, self.platform)
    }

    /// Serialize to the egress JSON body
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
