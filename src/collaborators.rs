//! Out-of-scope collaborator interfaces (spec.md §1): HTML→Markdown
//! conversion, syntax highlighting, image optimization, and output writing
//! are referenced by interface only. Minimal default implementations live
//! here so the binary is runnable end to end; swapping in a richer
//! converter or a remote output sink never touches the scheduler.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use sus_core::CrawlError;

/// Converts a fetched page's HTML into Markdown.
pub trait MarkdownConverter: Send + Sync {
    fn convert(&self, html: &str) -> Result<String, CrawlError>;
}

/// Persists converted Markdown to wherever the crawl's output lives.
#[async_trait]
pub trait OutputWriter: Send + Sync {
    async fn write(&self, path: &Path, content: &str) -> Result<(), CrawlError>;
}

/// `htmd`-based converter, grounded on
/// `cyrup-ai-kodegen-tools-citescrape`'s markdown_converter module — used
/// here at its default settings, with none of that crate's DOM filtering
/// or code-block post-processing.
#[derive(Debug, Default)]
pub struct HtmdConverter;

impl MarkdownConverter for HtmdConverter {
    fn convert(&self, html: &str) -> Result<String, CrawlError> {
        htmd::convert(html).map_err(|e| CrawlError::Parse(format!("markdown conversion failed: {e}")))
    }
}

/// Writes Markdown files to the local filesystem, creating parent
/// directories as needed.
pub struct FileOutputWriter {
    base_dir: PathBuf,
}

impl FileOutputWriter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[async_trait]
impl OutputWriter for FileOutputWriter {
    async fn write(&self, path: &Path, content: &str) -> Result<(), CrawlError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CrawlError::Other(anyhow::anyhow!("create output dir {}: {e}", parent.display())))?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|e| CrawlError::Other(anyhow::anyhow!("write output file {}: {e}", path.display())))?;
        Ok(())
    }
}
