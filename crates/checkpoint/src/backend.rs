use async_trait::async_trait;

use sus_core::{CheckpointMetadata, CrawlError, FrontierItem, PageCheckpoint};

/// Persistence contract for crawl checkpoints (spec.md §4.8). Implemented by
/// [`crate::json_backend::JsonBackend`] (single-file snapshot) and
/// [`crate::sqlite_backend::SqliteBackend`] (relational, for large crawls).
///
/// Grounded on `original_source/src/sus/backends/__init__.py`'s `StateBackend`
/// contract (`JSONBackend`/`SQLiteBackend` in the Python original); `iter_pages`
/// is collected into a `Vec` rather than modeled as an async generator, since
/// checkpoint sizes in this crawler's scope don't warrant streaming.
#[async_trait]
pub trait StateBackend: Send + Sync {
    async fn initialize(&self) -> Result<(), CrawlError>;
    async fn save_metadata(&self, metadata: &CheckpointMetadata) -> Result<(), CrawlError>;
    async fn load_metadata(&self) -> Result<Option<CheckpointMetadata>, CrawlError>;
    async fn add_page(&self, page: &PageCheckpoint) -> Result<(), CrawlError>;
    async fn get_page(&self, url: &str) -> Result<Option<PageCheckpoint>, CrawlError>;
    async fn has_page(&self, url: &str) -> Result<bool, CrawlError>;
    async fn get_page_count(&self) -> Result<u64, CrawlError>;
    async fn iter_pages(&self) -> Result<Vec<PageCheckpoint>, CrawlError>;
    async fn save_queue(&self, items: &[FrontierItem]) -> Result<(), CrawlError>;
    async fn get_queue(&self) -> Result<Vec<FrontierItem>, CrawlError>;
    /// `None` for `force_redownload_after_days` means "never redownload
    /// purely on age"; a known page then always returns `false`.
    async fn should_redownload(
        &self,
        url: &str,
        force_redownload_after_days: Option<u64>,
    ) -> Result<bool, CrawlError>;
    async fn commit(&self) -> Result<(), CrawlError>;
    async fn close(&self) -> Result<(), CrawlError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Json,
    Sqlite,
}

impl BackendKind {
    /// Auto-detects from a checkpoint path's extension, defaulting to JSON.
    pub fn detect(path: &std::path::Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("db") | Some("sqlite") | Some("sqlite3") => BackendKind::Sqlite,
            _ => BackendKind::Json,
        }
    }
}
