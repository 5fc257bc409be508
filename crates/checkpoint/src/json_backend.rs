use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use sus_core::{CheckpointMetadata, CrawlError, FrontierItem, PageCheckpoint};

use crate::backend::StateBackend;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointFile {
    metadata: Option<CheckpointMetadata>,
    pages: HashMap<String, PageCheckpoint>,
    queue: Vec<FrontierItem>,
}

/// Single-file JSON checkpoint backend — the default for small-to-medium
/// crawls, grounded on `original_source/src/sus/backends/json_backend.py`
/// (referenced by `backends/__init__.py`'s `create_backend` factory).
/// The whole state lives in memory and is rewritten atomically on
/// `commit`/`save_metadata`, matching the Python original's "save on every
/// metadata write" behavior.
pub struct JsonBackend {
    path: PathBuf,
    state: Mutex<CheckpointFile>,
}

impl JsonBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), state: Mutex::new(CheckpointFile::default()) }
    }

    async fn persist(&self, state: &CheckpointFile) -> Result<(), CrawlError> {
        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| CrawlError::Checkpoint(format!("serialize checkpoint: {e}")))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CrawlError::Checkpoint(format!("create checkpoint dir: {e}")))?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| CrawlError::Checkpoint(format!("write checkpoint: {e}")))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| CrawlError::Checkpoint(format!("rename checkpoint: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl StateBackend for JsonBackend {
    async fn initialize(&self) -> Result<(), CrawlError> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(());
        }
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| CrawlError::Checkpoint(format!("read checkpoint: {e}")))?;
        let loaded: CheckpointFile = serde_json::from_slice(&bytes)
            .map_err(|e| CrawlError::Checkpoint(format!("parse checkpoint: {e}")))?;
        *self.state.lock().await = loaded;
        Ok(())
    }

    async fn save_metadata(&self, metadata: &CheckpointMetadata) -> Result<(), CrawlError> {
        let mut state = self.state.lock().await;
        state.metadata = Some(metadata.clone());
        self.persist(&state).await
    }

    async fn load_metadata(&self) -> Result<Option<CheckpointMetadata>, CrawlError> {
        Ok(self.state.lock().await.metadata.clone())
    }

    async fn add_page(&self, page: &PageCheckpoint) -> Result<(), CrawlError> {
        let mut state = self.state.lock().await;
        state.pages.insert(page.url.clone(), page.clone());
        Ok(())
    }

    async fn get_page(&self, url: &str) -> Result<Option<PageCheckpoint>, CrawlError> {
        Ok(self.state.lock().await.pages.get(url).cloned())
    }

    async fn has_page(&self, url: &str) -> Result<bool, CrawlError> {
        Ok(self.state.lock().await.pages.contains_key(url))
    }

    async fn get_page_count(&self) -> Result<u64, CrawlError> {
        Ok(self.state.lock().await.pages.len() as u64)
    }

    async fn iter_pages(&self) -> Result<Vec<PageCheckpoint>, CrawlError> {
        Ok(self.state.lock().await.pages.values().cloned().collect())
    }

    async fn save_queue(&self, items: &[FrontierItem]) -> Result<(), CrawlError> {
        let mut state = self.state.lock().await;
        state.queue = items.to_vec();
        Ok(())
    }

    async fn get_queue(&self) -> Result<Vec<FrontierItem>, CrawlError> {
        Ok(self.state.lock().await.queue.clone())
    }

    async fn should_redownload(
        &self,
        url: &str,
        force_redownload_after_days: Option<u64>,
    ) -> Result<bool, CrawlError> {
        let state = self.state.lock().await;
        let Some(page) = state.pages.get(url) else { return Ok(true) };
        let Some(days) = force_redownload_after_days else { return Ok(false) };
        let age = Utc::now().signed_duration_since(page.last_scraped);
        Ok(age.num_days() >= days as i64)
    }

    async fn commit(&self) -> Result<(), CrawlError> {
        let state = self.state.lock().await;
        self.persist(&state).await
    }

    async fn close(&self) -> Result<(), CrawlError> {
        self.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sus_core::Stats;

    fn metadata() -> CheckpointMetadata {
        CheckpointMetadata {
            version: 1,
            config_name: "test".into(),
            config_hash: "abc123".into(),
            created_at: Utc::now(),
            last_updated: Utc::now(),
            stats: Stats::default(),
        }
    }

    fn page(url: &str) -> PageCheckpoint {
        PageCheckpoint {
            url: url.to_string(),
            content_hash: "def456".into(),
            last_scraped: Utc::now(),
            status_code: 200,
            file_path: "/output/page.md".into(),
        }
    }

    #[tokio::test]
    async fn roundtrips_metadata_pages_and_queue_through_a_fresh_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.json");

        let backend = JsonBackend::new(&path);
        backend.initialize().await.unwrap();
        backend.save_metadata(&metadata()).await.unwrap();
        backend.add_page(&page("https://example.com")).await.unwrap();
        backend
            .save_queue(&[FrontierItem {
                url: "https://example.com/page2".into(),
                referrer: Some("https://example.com".into()),
                depth: 1,
            }])
            .await
            .unwrap();
        backend.commit().await.unwrap();
        backend.close().await.unwrap();

        let reopened = JsonBackend::new(&path);
        reopened.initialize().await.unwrap();
        let loaded_meta = reopened.load_metadata().await.unwrap().unwrap();
        assert_eq!(loaded_meta.config_name, "test");

        let loaded_page = reopened.get_page("https://example.com").await.unwrap().unwrap();
        assert_eq!(loaded_page.content_hash, "def456");

        let queue = reopened.get_queue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].url, "https://example.com/page2");
    }

    #[tokio::test]
    async fn should_redownload_matches_presence_and_age_rules() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonBackend::new(dir.path().join("test.json"));
        backend.initialize().await.unwrap();

        assert!(backend.should_redownload("https://example.com", None).await.unwrap());

        let mut old_page = page("https://example.com");
        old_page.last_scraped = Utc::now() - chrono::Duration::days(365);
        backend.add_page(&old_page).await.unwrap();

        assert!(!backend.should_redownload("https://example.com", None).await.unwrap());
        assert!(backend.should_redownload("https://example.com", Some(7)).await.unwrap());
    }
}
