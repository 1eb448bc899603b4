//! Platform / TaskType - closed routing enumerations
//!
//! Inbound requests carry these as raw strings; parsing happens exactly once,
//! in the router (platform) and the mapper (task type).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Crawler platform served by a dedicated worker queue
///
/// Variant order is the lexical order of the wire names, so `Ord` (and any
/// `BTreeMap<Platform, _>`) iterates platforms alphabetically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "tiktok")]
    TikTok,
    #[serde(rename = "youtube")]
    YouTube,
}

impl Platform {
    /// Every platform known to the schema registry
    pub const ALL: [Platform; 2] = [Platform::TikTok, Platform::YouTube];

    /// Wire name (`youtube`, `tiktok`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::TikTok => "tiktok",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("platform", s))
    }
}

/// Kind of crawl work requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Search by a single keyword
    ResearchKeyword,
    /// Crawl an explicit list of video URLs
    CrawlLinks,
    /// Search several keywords and crawl the hits
    ResearchAndCrawl,
    /// Low-cost preview of `ResearchAndCrawl` with capped limits
    DryRunKeyword,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::ResearchKeyword,
        TaskType::CrawlLinks,
        TaskType::ResearchAndCrawl,
        TaskType::DryRunKeyword,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::ResearchKeyword => "research_keyword",
            TaskType::CrawlLinks => "crawl_links",
            TaskType::ResearchAndCrawl => "research_and_crawl",
            TaskType::DryRunKeyword => "dry_run_keyword",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("task_type", s))
    }
}

/// Parse failure for [`Platform`] / [`TaskType`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
