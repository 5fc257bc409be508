use serde::{Deserialize, Serialize};

use crate::error::CrawlError;

/// Top-level crawl configuration. Mirrors the Python original's `SusConfig`
/// (grouped into `site` / `crawling` / `cache` / `assets` / `output` /
/// `plugins`), loaded from TOML by the binary and otherwise opaque to the
/// core crawl engine — the engine only reads fields off this struct.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SusConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub site: SiteConfig,
    #[serde(default)]
    pub crawling: CrawlingRules,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub assets: AssetConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
}

impl SusConfig {
    /// Validates fields that aren't representable by the type system alone.
    /// Fatal-at-startup per spec.md §7.
    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.site.start_urls.is_empty() {
            return Err(CrawlError::Config("site.start_urls must not be empty".into()));
        }
        if let Some(mb) = self.crawling.max_page_size_mb {
            if mb < 0.1 {
                return Err(CrawlError::Config(
                    "crawling.max_page_size_mb must be >= 0.1 or null".into(),
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.crawling.retry_jitter) {
            return Err(CrawlError::Config(
                "crawling.retry_jitter must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    pub start_urls: Vec<String>,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    Glob,
    Regex,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UrlPattern {
    pub pattern: String,
    #[serde(rename = "type")]
    pub kind: PatternType,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CrawlingRules {
    pub max_pages: Option<u64>,
    pub depth_limit: u32,
    pub delay_between_requests: f64,
    pub global_concurrent_requests: usize,
    pub per_domain_concurrent_requests: usize,
    pub rate_limiter_burst_size: u32,
    pub max_retries: u32,
    pub retry_backoff: f64,
    pub retry_jitter: f64,
    pub max_redirects: u32,
    pub max_page_size_mb: Option<f64>,
    pub max_asset_size_mb: Option<f64>,
    pub respect_robots_txt: bool,
    pub include_patterns: Vec<UrlPattern>,
    pub exclude_patterns: Vec<UrlPattern>,
    pub link_selectors: Vec<String>,
}

impl Default for CrawlingRules {
    fn default() -> Self {
        Self {
            max_pages: None,
            depth_limit: 3,
            delay_between_requests: 0.0,
            global_concurrent_requests: 50,
            per_domain_concurrent_requests: 10,
            rate_limiter_burst_size: 10,
            max_retries: 3,
            retry_backoff: 2.0,
            retry_jitter: 0.3,
            max_redirects: 10,
            max_page_size_mb: Some(10.0),
            max_asset_size_mb: Some(50.0),
            respect_robots_txt: true,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            link_selectors: vec!["a[href]".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: CacheBackend,
    pub ttl_seconds: Option<u64>,
    pub cache_dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Sqlite,
            ttl_seconds: None,
            cache_dir: ".sus_cache".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Images,
    Css,
    Js,
    Fonts,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetConfig {
    pub download: bool,
    pub types: Vec<AssetType>,
    pub max_concurrent_asset_downloads: usize,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            download: true,
            types: vec![AssetType::Images, AssetType::Css, AssetType::Js, AssetType::Fonts],
            max_concurrent_asset_downloads: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PathMappingConfig {
    #[serde(default)]
    pub strip_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MarkdownConfig {
    #[serde(default)]
    pub front_matter: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub base_dir: String,
    #[serde(default = "default_docs_dir")]
    pub docs_dir: String,
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,
    #[serde(default)]
    pub path_mapping: PathMappingConfig,
    #[serde(default)]
    pub markdown: MarkdownConfig,
}

fn default_docs_dir() -> String {
    "docs".to_string()
}
fn default_assets_dir() -> String {
    "assets".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PluginsConfig {
    #[serde(default)]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub plugin_settings: std::collections::HashMap<String, serde_json::Value>,
}
