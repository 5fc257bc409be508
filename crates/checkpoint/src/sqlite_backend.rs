use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use sus_core::{CheckpointMetadata, CrawlError, FrontierItem, PageCheckpoint, Stats};

use crate::backend::StateBackend;

const MIGRATION: &str = include_str!("../migrations/001_init.sql");

/// Relational checkpoint backend for large crawls (spec.md §4.8), grounded
/// on `original_source/src/sus/backends/sqlite_backend.py` (referenced by
/// `backends/__init__.py`'s `create_backend` factory) — retargeted from the
/// teacher's Postgres-only `crates/storage` onto `sqlx`'s `sqlite` feature,
/// since this crawler runs as a single local process with no shared
/// database to connect to.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, CrawlError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CrawlError::Checkpoint(format!("create checkpoint dir: {e}")))?;
        }
        let options = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| CrawlError::Checkpoint(format!("open sqlite checkpoint: {e}")))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl StateBackend for SqliteBackend {
    async fn initialize(&self) -> Result<(), CrawlError> {
        sqlx::raw_sql(MIGRATION)
            .execute(&self.pool)
            .await
            .map_err(|e| CrawlError::Checkpoint(format!("run migrations: {e}")))?;
        Ok(())
    }

    async fn save_metadata(&self, metadata: &CheckpointMetadata) -> Result<(), CrawlError> {
        let stats_json = serde_json::to_string(&metadata.stats)
            .map_err(|e| CrawlError::Checkpoint(format!("serialize stats: {e}")))?;
        sqlx::query(
            "INSERT INTO metadata (id, version, config_name, config_hash, created_at, last_updated, stats_json)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                version = excluded.version,
                config_name = excluded.config_name,
                config_hash = excluded.config_hash,
                last_updated = excluded.last_updated,
                stats_json = excluded.stats_json",
        )
        .bind(metadata.version)
        .bind(&metadata.config_name)
        .bind(&metadata.config_hash)
        .bind(metadata.created_at.to_rfc3339())
        .bind(metadata.last_updated.to_rfc3339())
        .bind(stats_json)
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Checkpoint(format!("save metadata: {e}")))?;
        Ok(())
    }

    async fn load_metadata(&self) -> Result<Option<CheckpointMetadata>, CrawlError> {
        let row: Option<(u32, String, String, String, String, String)> = sqlx::query_as(
            "SELECT version, config_name, config_hash, created_at, last_updated, stats_json
             FROM metadata WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CrawlError::Checkpoint(format!("load metadata: {e}")))?;

        let Some((version, config_name, config_hash, created_at, last_updated, stats_json)) = row
        else {
            return Ok(None);
        };

        let stats: Stats = serde_json::from_str(&stats_json)
            .map_err(|e| CrawlError::Checkpoint(format!("parse stats: {e}")))?;
        Ok(Some(CheckpointMetadata {
            version,
            config_name,
            config_hash,
            created_at: parse_timestamp(&created_at)?,
            last_updated: parse_timestamp(&last_updated)?,
            stats,
        }))
    }

    async fn add_page(&self, page: &PageCheckpoint) -> Result<(), CrawlError> {
        sqlx::query(
            "INSERT INTO pages (url, content_hash, last_scraped, status_code, file_path)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(url) DO UPDATE SET
                content_hash = excluded.content_hash,
                last_scraped = excluded.last_scraped,
                status_code = excluded.status_code,
                file_path = excluded.file_path",
        )
        .bind(&page.url)
        .bind(&page.content_hash)
        .bind(page.last_scraped.to_rfc3339())
        .bind(page.status_code as i64)
        .bind(&page.file_path)
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Checkpoint(format!("add page: {e}")))?;
        Ok(())
    }

    async fn get_page(&self, url: &str) -> Result<Option<PageCheckpoint>, CrawlError> {
        let row: Option<(String, String, String, i64, String)> = sqlx::query_as(
            "SELECT url, content_hash, last_scraped, status_code, file_path FROM pages WHERE url = ?1",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CrawlError::Checkpoint(format!("get page: {e}")))?;

        let Some((url, content_hash, last_scraped, status_code, file_path)) = row else {
            return Ok(None);
        };
        Ok(Some(PageCheckpoint {
            url,
            content_hash,
            last_scraped: parse_timestamp(&last_scraped)?,
            status_code: status_code as u16,
            file_path,
        }))
    }

    async fn has_page(&self, url: &str) -> Result<bool, CrawlError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pages WHERE url = ?1")
            .bind(url)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CrawlError::Checkpoint(format!("has page: {e}")))?;
        Ok(row.0 > 0)
    }

    async fn get_page_count(&self) -> Result<u64, CrawlError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pages")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CrawlError::Checkpoint(format!("count pages: {e}")))?;
        Ok(row.0 as u64)
    }

    async fn iter_pages(&self) -> Result<Vec<PageCheckpoint>, CrawlError> {
        let rows: Vec<(String, String, String, i64, String)> = sqlx::query_as(
            "SELECT url, content_hash, last_scraped, status_code, file_path FROM pages",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CrawlError::Checkpoint(format!("iter pages: {e}")))?;

        rows.into_iter()
            .map(|(url, content_hash, last_scraped, status_code, file_path)| {
                Ok(PageCheckpoint {
                    url,
                    content_hash,
                    last_scraped: parse_timestamp(&last_scraped)?,
                    status_code: status_code as u16,
                    file_path,
                })
            })
            .collect()
    }

    async fn save_queue(&self, items: &[FrontierItem]) -> Result<(), CrawlError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CrawlError::Checkpoint(format!("begin queue tx: {e}")))?;
        sqlx::query("DELETE FROM queue")
            .execute(&mut *tx)
            .await
            .map_err(|e| CrawlError::Checkpoint(format!("clear queue: {e}")))?;
        for item in items {
            sqlx::query("INSERT INTO queue (url, referrer, depth) VALUES (?1, ?2, ?3)")
                .bind(&item.url)
                .bind(&item.referrer)
                .bind(item.depth as i64)
                .execute(&mut *tx)
                .await
                .map_err(|e| CrawlError::Checkpoint(format!("insert queue item: {e}")))?;
        }
        tx.commit().await.map_err(|e| CrawlError::Checkpoint(format!("commit queue tx: {e}")))?;
        Ok(())
    }

    async fn get_queue(&self) -> Result<Vec<FrontierItem>, CrawlError> {
        let rows: Vec<(String, Option<String>, i64)> =
            sqlx::query_as("SELECT url, referrer, depth FROM queue ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| CrawlError::Checkpoint(format!("get queue: {e}")))?;
        Ok(rows
            .into_iter()
            .map(|(url, referrer, depth)| FrontierItem { url, referrer, depth: depth as u32 })
            .collect())
    }

    async fn should_redownload(
        &self,
        url: &str,
        force_redownload_after_days: Option<u64>,
    ) -> Result<bool, CrawlError> {
        let Some(page) = self.get_page(url).await? else { return Ok(true) };
        let Some(days) = force_redownload_after_days else { return Ok(false) };
        let age = Utc::now().signed_duration_since(page.last_scraped);
        Ok(age.num_days() >= days as i64)
    }

    async fn commit(&self) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), CrawlError> {
        self.pool.close().await;
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CrawlError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CrawlError::Checkpoint(format!("parse timestamp {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> CheckpointMetadata {
        CheckpointMetadata {
            version: 1,
            config_name: "test-sqlite".into(),
            config_hash: "xyz789".into(),
            created_at: Utc::now(),
            last_updated: Utc::now(),
            stats: Stats::default(),
        }
    }

    fn page(i: usize) -> PageCheckpoint {
        PageCheckpoint {
            url: format!("https://example.com/page{i}"),
            content_hash: format!("hash{i}"),
            last_scraped: Utc::now(),
            status_code: 200,
            file_path: format!("/output/page{i}.md"),
        }
    }

    #[tokio::test]
    async fn persists_pages_metadata_and_queue_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let backend = SqliteBackend::open(&path).await.unwrap();
        backend.initialize().await.unwrap();
        backend.save_metadata(&metadata()).await.unwrap();
        for i in 0..100 {
            backend.add_page(&page(i)).await.unwrap();
        }
        backend.commit().await.unwrap();
        assert_eq!(backend.get_page_count().await.unwrap(), 100);

        let pages = backend.iter_pages().await.unwrap();
        assert_eq!(pages.len(), 100);

        backend
            .save_queue(&[FrontierItem { url: "https://example.com/next".into(), referrer: None, depth: 0 }])
            .await
            .unwrap();
        backend.close().await.unwrap();

        let reopened = SqliteBackend::open(&path).await.unwrap();
        reopened.initialize().await.unwrap();
        let loaded_meta = reopened.load_metadata().await.unwrap().unwrap();
        assert_eq!(loaded_meta.config_name, "test-sqlite");
        assert_eq!(reopened.get_page_count().await.unwrap(), 100);
        assert!(reopened.has_page("https://example.com/page99").await.unwrap());

        let queue = reopened.get_queue().await.unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn should_redownload_matches_presence_and_age_rules() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::open(dir.path().join("test.db")).await.unwrap();
        backend.initialize().await.unwrap();

        assert!(backend.should_redownload("https://example.com", None).await.unwrap());

        let mut old_page = page(0);
        old_page.url = "https://example.com".into();
        old_page.last_scraped = Utc::now() - chrono::Duration::days(365);
        backend.add_page(&old_page).await.unwrap();

        assert!(!backend.should_redownload("https://example.com", None).await.unwrap());
        assert!(backend.should_redownload("https://example.com", Some(7)).await.unwrap());
    }
}
