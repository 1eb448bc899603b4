//! Typed crawl payloads
//!
//! One record per (platform, task type) pair. Every field defaults to its
//! zero value so that decoding from an untyped bag keeps missing fields empty
//! instead of failing; unknown input fields are ignored.

use serde::{Deserialize, Serialize};

use crate::{Platform, TaskType};

fn is_zero(v: &u32) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

// ===== YouTube =====

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YouTubeResearchKeywordPayload {
    pub keyword: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub limit: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sort_by: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub time_range: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YouTubeCrawlLinksPayload {
    pub video_urls: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub include_channel: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub include_comments: bool,
    #[serde(skip_serializing_if = "is_zero")]
    pub max_comments: u32,
    #[serde(skip_serializing_if = "is_false")]
    pub download_media: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub media_type: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub time_range: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YouTubeResearchAndCrawlPayload {
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub limit_per_keyword: u32,
    #[serde(skip_serializing_if = "is_false")]
    pub include_comments: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub include_channel: bool,
    #[serde(skip_serializing_if = "is_zero")]
    pub max_comments: u32,
    #[serde(skip_serializing_if = "is_false")]
    pub download_media: bool,
    #[serde(skip_serializing_if = "is_zero")]
    pub time_range: u32,
}

// ===== TikTok =====

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TikTokResearchKeywordPayload {
    pub keyword: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub limit: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sort_by: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub time_range: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TikTokCrawlLinksPayload {
    pub video_urls: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub include_comments: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub include_creator: bool,
    #[serde(skip_serializing_if = "is_zero")]
    pub max_comments: u32,
    #[serde(skip_serializing_if = "is_false")]
    pub download_media: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub media_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub media_save_dir: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub time_range: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TikTokResearchAndCrawlPayload {
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub limit_per_keyword: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sort_by: String,
    #[serde(skip_serializing_if = "is_false")]
    pub include_comments: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub include_creator: bool,
    #[serde(skip_serializing_if = "is_zero")]
    pub max_comments: u32,
    #[serde(skip_serializing_if = "is_false")]
    pub download_media: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub media_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub media_save_dir: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub time_range: u32,
}

/// Typed payload attached to an outbound task
///
/// Serialized untagged: the wire body carries only the inner record, the
/// platform and task type travel as sibling fields of the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TaskPayload {
    YouTubeResearchKeyword(YouTubeResearchKeywordPayload),
    YouTubeCrawlLinks(YouTubeCrawlLinksPayload),
    YouTubeResearchAndCrawl(YouTubeResearchAndCrawlPayload),
    TikTokResearchKeyword(TikTokResearchKeywordPayload),
    TikTokCrawlLinks(TikTokCrawlLinksPayload),
    TikTokResearchAndCrawl(TikTokResearchAndCrawlPayload),
}

impl TaskPayload {
    /// Platform this payload shape belongs to
    pub fn platform(&self) -> Platform {
        match self {
            TaskPayload::YouTubeResearchKeyword(_)
            | TaskPayload::YouTubeCrawlLinks(_)
            | TaskPayload::YouTubeResearchAndCrawl(_) => Platform::YouTube,
            TaskPayload::TikTokResearchKeyword(_)
            | TaskPayload::TikTokCrawlLinks(_)
            | TaskPayload::TikTokResearchAndCrawl(_) => Platform::TikTok,
        }
    }

    /// Task type whose schema produced this shape
    ///
    /// Dry-run payloads report `ResearchAndCrawl`: they share its shape.
    pub fn shape(&self) -> TaskType {
        match self {
            TaskPayload::YouTubeResearchKeyword(_) | TaskPayload::TikTokResearchKeyword(_) => {
                TaskType::ResearchKeyword
            }
            TaskPayload::YouTubeCrawlLinks(_) | TaskPayload::TikTokCrawlLinks(_) => {
                TaskType::CrawlLinks
            }
            TaskPayload::YouTubeResearchAndCrawl(_) | TaskPayload::TikTokResearchAndCrawl(_) => {
                TaskType::ResearchAndCrawl
            }
        }
    }

    /// Untyped JSON object form, as a producer would have sent it
    pub fn to_value(&self) -> serde_json::Value {
        // Plain structs of strings/ints/bools never fail to serialize
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
