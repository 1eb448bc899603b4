//! CrawlRequest - inbound message from the ingress queue
//!
//! Untyped on purpose: platform and task type stay raw strings until the
//! router and mapper resolve them, and the payload is a free-form JSON bag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Generic crawl request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlRequest {
    /// Job identifier assigned by the producer
    #[serde(default)]
    pub job_id: String,

    /// Task type name (required, e.g. `research_keyword`)
    #[serde(default)]
    pub task_type: String,

    /// Target platform name; empty means fan out to every configured platform
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub platform: String,

    /// Untyped payload, decoded per (platform, task type)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, Value>>,

    /// Time-range hint (days)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<u32>,

    /// Attempt counter; values <= 0 are normalized to 1
    #[serde(default)]
    pub attempt: i32,

    /// Maximum attempts; values <= 0 take the configured default
    #[serde(default)]
    pub max_attempts: i32,

    /// Emission time; absent or zero timestamps are replaced with "now"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emitted_at: Option<DateTime<Utc>>,
}

impl CrawlRequest {
    /// Create a request with the required fields only
    pub fn new(job_id: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            task_type: task_type.into(),
            ..Default::default()
        }
    }

    /// Set the explicit target platform
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Set the payload from a JSON object (non-objects clear the payload)
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = match payload {
            Value::Object(map) => Some(map),
            _ => None,
        };
        self
    }

    /// Whether the request asks for fan-out
    pub fn is_fan_out(&self) -> bool {
        self.platform.is_empty()
    }

    /// Whether `emitted_at` still needs a value
    ///
    /// Producers that serialize a zero time send `0001-01-01T00:00:00Z`, so
    /// anything at or before the Unix epoch counts as unset.
    pub fn emitted_at_is_unset(&self) -> bool {
        self.emitted_at.is_none_or(|ts| ts.timestamp() <= 0)
    }
}
