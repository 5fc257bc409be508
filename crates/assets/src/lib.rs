//! Background asset downloading (spec.md §4.9), decoupled from page fetch
//! throughput. Grounded on `original_source/src/sus/assets.py`'s
//! `AssetDownloader`: a semaphore-bounded pool of detached download tasks,
//! a `downloaded` dedup set, and a per-error-kind histogram that never lets
//! an asset failure propagate to the crawl loop.

pub mod path_mapper;

pub use path_mapper::AssetPathMapper;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use sus_core::Stats;

#[derive(Debug, Clone)]
pub struct AssetCoordinatorConfig {
    pub max_concurrent_downloads: usize,
    pub max_asset_size_bytes: Option<u64>,
}

/// Spawns and tracks detached per-asset download tasks. `submit` returns
/// immediately; call `join_all` once the scheduler is winding down to await
/// (or time-box) every outstanding download.
pub struct AssetCoordinator {
    client: reqwest::Client,
    mapper: AssetPathMapper,
    semaphore: Arc<Semaphore>,
    downloaded: Arc<Mutex<HashSet<String>>>,
    stats: Arc<Mutex<Stats>>,
    max_asset_size_bytes: Option<u64>,
    tasks: Mutex<JoinSet<()>>,
}

impl AssetCoordinator {
    pub fn new(
        config: AssetCoordinatorConfig,
        client: reqwest::Client,
        mapper: AssetPathMapper,
        stats: Arc<Mutex<Stats>>,
    ) -> Self {
        Self {
            client,
            mapper,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1))),
            downloaded: Arc::new(Mutex::new(HashSet::new())),
            stats,
            max_asset_size_bytes: config.max_asset_size_bytes,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Dedup-checks `url`, then spawns a detached download task. Returns
    /// immediately regardless of outcome — failures are tallied, never
    /// propagated.
    pub async fn submit(&self, url: String) {
        {
            let mut seen = self.downloaded.lock().await;
            if !seen.insert(url.clone()) {
                return;
            }
        }

        let client = self.client.clone();
        let mapper = self.mapper.clone();
        let stats = self.stats.clone();
        let max_size = self.max_asset_size_bytes;
        let semaphore = self.semaphore.clone();

        let mut tasks = self.tasks.lock().await;
        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else { return };
            download_one(&client, &mapper, &stats, &url, max_size).await;
        });
    }

    /// Awaits every outstanding download task. Intended for orderly
    /// shutdown (spec.md §4.7's "joined at shutdown").
    pub async fn join_all(&self) {
        let mut tasks = self.tasks.lock().await;
        while tasks.join_next().await.is_some() {}
    }

    pub async fn downloaded_count(&self) -> usize {
        self.downloaded.lock().await.len()
    }
}

async fn download_one(
    client: &reqwest::Client,
    mapper: &AssetPathMapper,
    stats: &Arc<Mutex<Stats>>,
    url: &str,
    max_size_bytes: Option<u64>,
) {
    let path = mapper.path_for(url);

    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        let mut stats = stats.lock().await;
        stats.skipped_existing += 1;
        return;
    }

    let result = async {
        let resp = client.get(url).send().await.map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("http {}", resp.status()));
        }
        if let (Some(max), Some(len)) = (max_size_bytes, resp.content_length()) {
            if len > max {
                return Err("asset too large".to_string());
            }
        }
        let bytes = resp.bytes().await.map_err(|e| e.to_string())?;
        if let Some(max) = max_size_bytes {
            if bytes.len() as u64 > max {
                return Err("asset too large".to_string());
            }
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| e.to_string())?;
        }
        tokio::fs::write(&path, &bytes).await.map_err(|e| e.to_string())?;
        Ok::<u64, String>(bytes.len() as u64)
    }
    .await;

    let mut stats = stats.lock().await;
    match result {
        Ok(size) => {
            stats.assets_downloaded += 1;
            stats.bytes_downloaded += size;
            debug!(url, size, "asset downloaded");
        }
        Err(kind) => {
            stats.assets_failed += 1;
            *stats.error_counts.entry(kind.clone()).or_insert(0) += 1;
            warn!(url, error = %kind, "asset download failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn coordinator(dir: &std::path::Path, max_size: Option<u64>) -> AssetCoordinator {
        AssetCoordinator::new(
            AssetCoordinatorConfig { max_concurrent_downloads: 4, max_asset_size_bytes: max_size },
            reqwest::Client::new(),
            AssetPathMapper::new(PathBuf::from(dir), None),
            Arc::new(Mutex::new(Stats::default())),
        )
    }

    #[tokio::test]
    async fn downloads_and_tallies_success() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/logo.png").with_body("pngdata").create_async().await;
        let dir = tempfile::tempdir().unwrap();
        let coord = coordinator(dir.path(), None);

        let url = format!("{}/logo.png", server.url());
        coord.submit(url).await;
        coord.join_all().await;

        let stats = coord.stats.lock().await;
        assert_eq!(stats.assets_downloaded, 1);
        assert_eq!(stats.assets_failed, 0);
    }

    #[tokio::test]
    async fn duplicate_submissions_download_once() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/a.css").with_body("css").expect(1).create_async().await;
        let dir = tempfile::tempdir().unwrap();
        let coord = coordinator(dir.path(), None);

        let url = format!("{}/a.css", server.url());
        coord.submit(url.clone()).await;
        coord.submit(url).await;
        coord.join_all().await;

        assert_eq!(coord.downloaded_count().await, 1);
    }

    #[tokio::test]
    async fn failure_is_tallied_and_does_not_panic() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/missing.png").with_status(404).create_async().await;
        let dir = tempfile::tempdir().unwrap();
        let coord = coordinator(dir.path(), None);

        let url = format!("{}/missing.png", server.url());
        coord.submit(url).await;
        coord.join_all().await;

        let stats = coord.stats.lock().await;
        assert_eq!(stats.assets_failed, 1);
        assert_eq!(stats.assets_downloaded, 0);
    }

    #[tokio::test]
    async fn multi_asset_failure_isolation() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/1.png").with_status(404).create_async().await;
        server.mock("GET", "/2.png").with_body("ok").create_async().await;
        server.mock("GET", "/3.png").with_body("ok").create_async().await;
        let dir = tempfile::tempdir().unwrap();
        let coord = coordinator(dir.path(), None);

        for path in ["/1.png", "/2.png", "/3.png"] {
            coord.submit(format!("{}{path}", server.url())).await;
        }
        coord.join_all().await;

        let stats = coord.stats.lock().await;
        assert_eq!(stats.assets_downloaded, 2);
        assert_eq!(stats.assets_failed, 1);
    }
}
