//! Hook-based plugin system (spec.md §B, supplemented from
//! `original_source/src/sus/plugins/__init__.py`), allowing custom processing
//! at crawl lifecycle points. Every hook is a notification except
//! `post_convert`, which chains: each plugin receives the previous one's
//! output and may transform it.

use async_trait::async_trait;

use sus_core::{Stats, SusConfig};

/// Base trait for all plugins. Every method has a no-op default so a
/// plugin need only override the hooks it cares about.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique plugin identifier, used in logs and `plugins.enabled`.
    fn name(&self) -> &str;

    async fn pre_crawl(&self, _config: &SusConfig) {}

    async fn post_fetch(&self, _url: &str, _html: &str, _status_code: u16) {}

    /// The only hook that mutates data: returns the (possibly modified)
    /// markdown, passed along to the next plugin in the chain.
    async fn post_convert(&self, _url: &str, markdown: String) -> String {
        markdown
    }

    async fn post_save(&self, _file_path: &str, _content_type: &str) {}

    async fn post_crawl(&self, _stats: &Stats) {}
}

/// Runs every registered plugin, in registration order, at each lifecycle
/// point.
#[derive(Default)]
pub struct PluginDispatcher {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginDispatcher {
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    pub async fn pre_crawl(&self, config: &SusConfig) {
        for plugin in &self.plugins {
            plugin.pre_crawl(config).await;
        }
    }

    pub async fn post_fetch(&self, url: &str, html: &str, status_code: u16) {
        for plugin in &self.plugins {
            plugin.post_fetch(url, html, status_code).await;
        }
    }

    /// Threads `markdown` through every plugin's `post_convert`, in order.
    pub async fn post_convert(&self, url: &str, markdown: String) -> String {
        let mut current = markdown;
        for plugin in &self.plugins {
            current = plugin.post_convert(url, current).await;
        }
        current
    }

    pub async fn post_save(&self, file_path: &str, content_type: &str) {
        for plugin in &self.plugins {
            plugin.post_save(file_path, content_type).await;
        }
    }

    pub async fn post_crawl(&self, stats: &Stats) {
        for plugin in &self.plugins {
            plugin.post_crawl(stats).await;
        }
    }
}
