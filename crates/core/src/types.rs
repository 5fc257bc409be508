use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An item waiting to be fetched. Uniquely identified by its normalized URL;
/// the frontier drops the second arrival of the same URL (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierItem {
    pub url: String,
    pub referrer: Option<String>,
    pub depth: u32,
}

/// The outcome of a successful fetch + link extraction pass over one page.
#[derive(Debug, Clone)]
pub struct CrawlResult {
    pub requested_url: String,
    pub final_url: String,
    pub html: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub links: Vec<String>,
    pub assets: Vec<String>,
}

/// Durable record of one fetched page (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageCheckpoint {
    pub url: String,
    pub content_hash: String,
    pub last_scraped: chrono::DateTime<chrono::Utc>,
    pub status_code: u16,
    pub file_path: String,
}

/// Run-level checkpoint metadata, used to decide whether a stored page is
/// still fresh (spec.md §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub version: u32,
    pub config_name: String,
    pub config_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
    pub stats: Stats,
}

/// Monotonic crawl counters plus a symbolic error-kind histogram
/// (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub pages_crawled: u64,
    pub pages_failed: u64,
    pub assets_downloaded: u64,
    pub assets_failed: u64,
    pub bytes_downloaded: u64,
    pub skipped_existing: u64,
    pub error_counts: HashMap<String, u64>,
}

impl Stats {
    pub fn record_error(&mut self, kind: crate::error::ErrorKind) {
        *self.error_counts.entry(kind.as_str().to_string()).or_insert(0) += 1;
    }
}

/// An asset URL discovered on a page, classified by what kind of resource
/// it names (spec.md §B: supplemented from the Python original's
/// `Asset.type`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtractedAsset {
    pub url: String,
    pub kind: crate::config::AssetType,
}
