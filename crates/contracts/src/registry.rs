//! Schema registry
//!
//! Static table mapping (platform, task type) to the typed payload shape.
//! Adding a platform means adding its rows here; nothing else in the
//! workspace compares platform strings.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::payload::*;
use crate::{Platform, TaskPayload, TaskType};

/// `limit_per_keyword` forced onto every dry-run payload
pub const DRY_RUN_LIMIT_PER_KEYWORD: u32 = 3;

/// `max_comments` forced onto every dry-run payload
pub const DRY_RUN_MAX_COMMENTS: u32 = 5;

/// Registered payload shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSchema {
    YouTubeResearchKeyword,
    YouTubeCrawlLinks,
    YouTubeResearchAndCrawl,
    TikTokResearchKeyword,
    TikTokCrawlLinks,
    TikTokResearchAndCrawl,
}

/// One registry row
#[derive(Debug, Clone, Copy)]
pub struct SchemaEntry {
    pub platform: Platform,
    pub task_type: TaskType,
    pub schema: PayloadSchema,
    /// Apply dry-run caps after decoding
    pub dry_run: bool,
}

const fn entry(
    platform: Platform,
    task_type: TaskType,
    schema: PayloadSchema,
    dry_run: bool,
) -> SchemaEntry {
    SchemaEntry {
        platform,
        task_type,
        schema,
        dry_run,
    }
}

/// The registry itself
pub const SCHEMA_REGISTRY: &[SchemaEntry] = &[
    entry(
        Platform::YouTube,
        TaskType::ResearchKeyword,
        PayloadSchema::YouTubeResearchKeyword,
        false,
    ),
    entry(
        Platform::YouTube,
        TaskType::CrawlLinks,
        PayloadSchema::YouTubeCrawlLinks,
        false,
    ),
    entry(
        Platform::YouTube,
        TaskType::ResearchAndCrawl,
        PayloadSchema::YouTubeResearchAndCrawl,
        false,
    ),
    entry(
        Platform::YouTube,
        TaskType::DryRunKeyword,
        PayloadSchema::YouTubeResearchAndCrawl,
        true,
    ),
    entry(
        Platform::TikTok,
        TaskType::ResearchKeyword,
        PayloadSchema::TikTokResearchKeyword,
        false,
    ),
    entry(
        Platform::TikTok,
        TaskType::CrawlLinks,
        PayloadSchema::TikTokCrawlLinks,
        false,
    ),
    entry(
        Platform::TikTok,
        TaskType::ResearchAndCrawl,
        PayloadSchema::TikTokResearchAndCrawl,
        false,
    ),
    entry(
        Platform::TikTok,
        TaskType::DryRunKeyword,
        PayloadSchema::TikTokResearchAndCrawl,
        true,
    ),
];

/// Look up the registry row for a pair
pub fn lookup(platform: Platform, task_type: TaskType) -> Option<&'static SchemaEntry> {
    SCHEMA_REGISTRY
        .iter()
        .find(|e| e.platform == platform && e.task_type == task_type)
}

impl SchemaEntry {
    /// Decode an untyped bag into this row's payload
    ///
    /// Round-trips the bag through the typed record: unknown keys are
    /// ignored, missing keys keep zero values, mismatched value types fail.
    /// Dry-run caps are applied after a successful decode.
    pub fn decode(&self, raw: &Map<String, Value>) -> Result<TaskPayload, serde_json::Error> {
        let mut payload = self.schema.decode(raw)?;
        if self.dry_run {
            apply_dry_run_caps(&mut payload);
        }
        Ok(payload)
    }
}

impl PayloadSchema {
    pub fn decode(&self, raw: &Map<String, Value>) -> Result<TaskPayload, serde_json::Error> {
        Ok(match self {
            PayloadSchema::YouTubeResearchKeyword => {
                TaskPayload::YouTubeResearchKeyword(from_bag(raw)?)
            }
            PayloadSchema::YouTubeCrawlLinks => TaskPayload::YouTubeCrawlLinks(from_bag(raw)?),
            PayloadSchema::YouTubeResearchAndCrawl => {
                TaskPayload::YouTubeResearchAndCrawl(from_bag(raw)?)
            }
            PayloadSchema::TikTokResearchKeyword => {
                TaskPayload::TikTokResearchKeyword(from_bag(raw)?)
            }
            PayloadSchema::TikTokCrawlLinks => TaskPayload::TikTokCrawlLinks(from_bag(raw)?),
            PayloadSchema::TikTokResearchAndCrawl => {
                TaskPayload::TikTokResearchAndCrawl(from_bag(raw)?)
            }
        })
    }
}

fn from_bag<T: DeserializeOwned>(raw: &Map<String, Value>) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(raw.clone()))
}

fn apply_dry_run_caps(payload: &mut TaskPayload) {
    match payload {
        TaskPayload::YouTubeResearchAndCrawl(p) => {
            p.limit_per_keyword = DRY_RUN_LIMIT_PER_KEYWORD;
            p.include_comments = true;
            p.max_comments = DRY_RUN_MAX_COMMENTS;
        }
        TaskPayload::TikTokResearchAndCrawl(p) => {
            p.limit_per_keyword = DRY_RUN_LIMIT_PER_KEYWORD;
            p.include_comments = true;
            p.max_comments = DRY_RUN_MAX_COMMENTS;
        }
        // Dry-run rows only ever point at research-and-crawl shapes
        _ => {}
    }
}
