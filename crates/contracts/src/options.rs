//! DispatchOptions - process-wide dispatch settings
//!
//! Built once from configuration and shared read-only. There are no implicit
//! fallbacks: every value must be present and valid at construction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{ContractError, Platform};

/// Immutable dispatch options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDispatchOptions")]
pub struct DispatchOptions {
    default_max_attempts: u32,
    schema_version: u32,
    platform_queues: BTreeMap<Platform, String>,
}

#[derive(Deserialize)]
struct RawDispatchOptions {
    default_max_attempts: u32,
    schema_version: u32,
    platform_queues: BTreeMap<Platform, String>,
}

impl TryFrom<RawDispatchOptions> for DispatchOptions {
    type Error = ContractError;

    fn try_from(raw: RawDispatchOptions) -> Result<Self, Self::Error> {
        Self::new(
            raw.default_max_attempts,
            raw.schema_version,
            raw.platform_queues,
        )
    }
}

impl DispatchOptions {
    /// Validate and build options
    ///
    /// # Errors
    /// - `default_max_attempts` or `schema_version` is zero
    /// - `platform_queues` is empty or maps a platform to an empty routing key
    pub fn new(
        default_max_attempts: u32,
        schema_version: u32,
        platform_queues: BTreeMap<Platform, String>,
    ) -> Result<Self, ContractError> {
        if default_max_attempts == 0 {
            return Err(ContractError::config_validation(
                "dispatch.default_max_attempts",
                "must be >= 1",
            ));
        }
        if schema_version == 0 {
            return Err(ContractError::config_validation(
                "dispatch.schema_version",
                "must be >= 1",
            ));
        }
        if platform_queues.is_empty() {
            return Err(ContractError::config_validation(
                "dispatch.platform_queues",
                "at least one platform queue is required",
            ));
        }
        if let Some((platform, _)) = platform_queues.iter().find(|(_, q)| q.trim().is_empty()) {
            return Err(ContractError::config_validation(
                format!("dispatch.platform_queues.{platform}"),
                "routing key cannot be empty",
            ));
        }

        Ok(Self {
            default_max_attempts,
            schema_version,
            platform_queues,
        })
    }

    pub fn default_max_attempts(&self) -> u32 {
        self.default_max_attempts
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Platform -> routing key, sorted by platform
    pub fn platform_queues(&self) -> &BTreeMap<Platform, String> {
        &self.platform_queues
    }

    /// Routing key for a platform, if it is a configured target
    pub fn routing_key(&self, platform: Platform) -> Option<&str> {
        self.platform_queues.get(&platform).map(String::as_str)
    }
}

/// Conventional routing key for a platform queue (`crawler.<platform>.queue`)
pub fn default_routing_key(platform: Platform) -> String {
    format!("crawler.{platform}.queue")
}
