//! Config-hash computation (spec.md §3, §4.8; grounded on
//! `original_source/src/sus/backends/__init__.py::compute_config_hash`).
//!
//! Hashes only the crawl-relevant fields of `SusConfig` — start URLs,
//! allowed domains, include/exclude patterns, depth limit, link selectors —
//! so output-path renames don't invalidate a checkpoint, but a meaningful
//! change to crawl behavior does.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::{SusConfig, UrlPattern};

#[derive(Serialize)]
struct ConfigHashInput<'a> {
    name: &'a str,
    start_urls: Vec<&'a str>,
    allowed_domains: Vec<&'a str>,
    include_patterns: &'a [UrlPattern],
    exclude_patterns: &'a [UrlPattern],
    depth_limit: u32,
    link_selectors: &'a [String],
}

/// SHA-256 over a canonical JSON projection of the crawl-relevant config
/// fields. Two configs differing only in output paths hash identically.
pub fn compute_config_hash(config: &SusConfig) -> String {
    let mut start_urls: Vec<&str> = config.site.start_urls.iter().map(String::as_str).collect();
    start_urls.sort_unstable();
    let mut allowed_domains: Vec<&str> =
        config.site.allowed_domains.iter().map(String::as_str).collect();
    allowed_domains.sort_unstable();

    let input = ConfigHashInput {
        name: &config.name,
        start_urls,
        allowed_domains,
        include_patterns: &config.crawling.include_patterns,
        exclude_patterns: &config.crawling.exclude_patterns,
        depth_limit: config.crawling.depth_limit,
        link_selectors: &config.crawling.link_selectors,
    };

    // serde_json preserves struct field order, which is fixed above, so this
    // produces a deterministic byte stream across runs.
    let json = serde_json::to_vec(&input).expect("config hash input is always serializable");
    let digest = Sha256::digest(&json);
    hex::encode(digest)
}

/// SHA-256 of a response body, used to detect whether a page's content
/// changed between runs (spec.md §3: `content_hash`).
pub fn compute_content_hash(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, CrawlingRules, OutputConfig, PathMappingConfig, MarkdownConfig, PluginsConfig, SiteConfig};

    fn base_config() -> SusConfig {
        SusConfig {
            name: "test".into(),
            description: String::new(),
            site: SiteConfig {
                start_urls: vec!["https://example.com/".into()],
                allowed_domains: vec!["example.com".into()],
            },
            crawling: CrawlingRules::default(),
            cache: CacheConfig::default(),
            assets: Default::default(),
            output: OutputConfig {
                base_dir: "out".into(),
                docs_dir: "docs".into(),
                assets_dir: "assets".into(),
                path_mapping: PathMappingConfig::default(),
                markdown: MarkdownConfig::default(),
            },
            plugins: PluginsConfig::default(),
        }
    }

    #[test]
    fn output_path_rename_does_not_change_hash() {
        let a = base_config();
        let mut b = base_config();
        b.output.base_dir = "somewhere-else".into();
        assert_eq!(compute_config_hash(&a), compute_config_hash(&b));
    }

    #[test]
    fn depth_limit_change_invalidates_hash() {
        let a = base_config();
        let mut b = base_config();
        b.crawling.depth_limit += 1;
        assert_ne!(compute_config_hash(&a), compute_config_hash(&b));
    }

    #[test]
    fn start_url_order_does_not_matter() {
        let mut a = base_config();
        a.site.start_urls = vec!["https://a.com/".into(), "https://b.com/".into()];
        let mut b = base_config();
        b.site.start_urls = vec!["https://b.com/".into(), "https://a.com/".into()];
        assert_eq!(compute_config_hash(&a), compute_config_hash(&b));
    }
}
