//! The crawl orchestrator (spec.md §4.7): pops frontier items under global
//! and per-domain concurrency gates plus a rate limiter, fetches, extracts
//! links/assets, converts to Markdown, and checkpoints — all pipelined
//! across a fixed worker pool.
//!
//! Worker tasks pull from a shared frontier; a `broadcast` shutdown signal
//! subscribed by every worker and a `Ctrl-C` listener together trigger an
//! orderly wind-down. One worker pool gated by a global semaphore plus
//! lazily-created per-domain semaphores, since this crawler has a single
//! transport and no per-network split to make.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use url::Url;

use sus_assets::{AssetCoordinator, AssetCoordinatorConfig, AssetPathMapper};
use sus_checkpoint::StateBackend;
use sus_core::{
    compute_config_hash, compute_content_hash, CheckpointMetadata, CrawlError, ErrorKind,
    FrontierItem, PageCheckpoint, PatternMatcher, Stats, SusConfig,
};
use sus_fetcher::{FetchConfig, Fetcher};
use sus_frontier::Frontier;
use sus_parser::{extract_assets, extract_links};
use sus_plugins::PluginDispatcher;
use sus_ratelimit::{DomainRateLimiter, RateLimitConfig, SharedRateLimiter};
use sus_robots::RobotsCache;

use crate::collaborators::{MarkdownConverter, OutputWriter};

/// Checkpoint is committed at least this often (spec.md §4.7 step 9's
/// "default 50"), in addition to always at shutdown.
const CHECKPOINT_COMMIT_INTERVAL: u64 = 50;

pub struct Scheduler {
    config: SusConfig,
    config_hash: String,
    created_at: DateTime<Utc>,
    /// Set at startup when the stored checkpoint's config hash differs from
    /// this run's, forcing every URL to be treated as stale (spec.md §4.8
    /// clause (c)).
    force_refetch_all: bool,

    frontier: Arc<Frontier>,
    fetcher: Arc<Fetcher>,
    robots: Arc<RobotsCache>,
    rate_limiter: SharedRateLimiter,
    checkpoint: Arc<dyn StateBackend>,
    assets: Arc<AssetCoordinator>,
    plugins: Arc<PluginDispatcher>,
    converter: Arc<dyn MarkdownConverter>,
    writer: Arc<dyn OutputWriter>,
    docs_mapper: AssetPathMapper,

    global_semaphore: Arc<Semaphore>,
    domain_semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
    in_flight: AtomicUsize,
    pages_done: AtomicU64,
    stats: Arc<Mutex<Stats>>,

    include_patterns: PatternMatcher,
    exclude_patterns: PatternMatcher,
}

impl Scheduler {
    pub async fn new(
        config: SusConfig,
        checkpoint: Arc<dyn StateBackend>,
        plugins: Arc<PluginDispatcher>,
        converter: Arc<dyn MarkdownConverter>,
        writer: Arc<dyn OutputWriter>,
    ) -> Result<Arc<Self>, CrawlError> {
        config.validate()?;

        let user_agent = format!("SUS/{} (Simple Universal Scraper)", env!("CARGO_PKG_VERSION"));
        let fetch_config = FetchConfig {
            user_agent: user_agent.clone(),
            max_retries: config.crawling.max_retries,
            retry_backoff: config.crawling.retry_backoff,
            retry_jitter: config.crawling.retry_jitter,
            max_redirects: config.crawling.max_redirects,
            max_page_size_bytes: config.crawling.max_page_size_mb.map(mb_to_bytes),
            ..FetchConfig::default()
        };
        let fetcher = Arc::new(Fetcher::new(fetch_config)?);

        let shared_client = reqwest::Client::builder()
            .user_agent(user_agent.clone())
            .build()
            .map_err(|e| CrawlError::Config(format!("failed to build shared http client: {e}")))?;

        let robots = Arc::new(RobotsCache::new(shared_client.clone(), user_agent, None));

        let rate_limiter: SharedRateLimiter = Arc::new(DomainRateLimiter::new(RateLimitConfig {
            delay_between_requests: config.crawling.delay_between_requests,
            burst_size: config.crawling.rate_limiter_burst_size,
        }));

        let base_dir = PathBuf::from(&config.output.base_dir);
        let docs_dir = base_dir.join(&config.output.docs_dir);
        let assets_dir = base_dir.join(&config.output.assets_dir);
        let strip_prefix = config.output.path_mapping.strip_prefix.clone();
        let docs_mapper = AssetPathMapper::new(docs_dir, strip_prefix.clone());
        let asset_mapper = AssetPathMapper::new(assets_dir, strip_prefix);

        let stats = Arc::new(Mutex::new(Stats::default()));
        let assets = Arc::new(AssetCoordinator::new(
            AssetCoordinatorConfig {
                max_concurrent_downloads: config.assets.max_concurrent_asset_downloads,
                max_asset_size_bytes: config.crawling.max_asset_size_mb.map(mb_to_bytes),
            },
            shared_client,
            asset_mapper,
            stats.clone(),
        ));

        let config_hash = compute_config_hash(&config);
        let stored_metadata = checkpoint.load_metadata().await?;
        let force_refetch_all = stored_metadata
            .as_ref()
            .map(|m| m.config_hash != config_hash)
            .unwrap_or(false);
        if force_refetch_all {
            info!("crawl-relevant config changed since last run, invalidating checkpoint freshness");
        }

        let created_at = stored_metadata.as_ref().map(|m| m.created_at).unwrap_or_else(Utc::now);
        let pages_done = if force_refetch_all {
            0
        } else {
            stored_metadata.as_ref().map(|m| m.stats.pages_crawled).unwrap_or(0)
        };
        if let Some(meta) = &stored_metadata {
            if !force_refetch_all {
                *stats.lock().await = meta.stats.clone();
            }
        }

        let frontier = Arc::new(Frontier::new());
        let mut resumed_queue = false;
        for saved in checkpoint.get_queue().await? {
            if frontier.push(saved) {
                resumed_queue = true;
            }
        }
        if !force_refetch_all {
            frontier.mark_seen(checkpoint.iter_pages().await?.into_iter().map(|p| p.url));
        }
        if !resumed_queue {
            for start in &config.site.start_urls {
                frontier.push(FrontierItem { url: start.clone(), referrer: None, depth: 0 });
            }
        }

        let include_patterns = PatternMatcher::compile(&config.crawling.include_patterns);
        let exclude_patterns = PatternMatcher::compile(&config.crawling.exclude_patterns);

        plugins.pre_crawl(&config).await;

        Ok(Arc::new(Self {
            global_semaphore: Arc::new(Semaphore::new(config.crawling.global_concurrent_requests.max(1))),
            domain_semaphores: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            pages_done: AtomicU64::new(pages_done),
            created_at,
            force_refetch_all,
            config_hash,
            config,
            frontier,
            fetcher,
            robots,
            rate_limiter,
            checkpoint,
            assets,
            plugins,
            converter,
            writer,
            docs_mapper,
            stats,
            include_patterns,
            exclude_patterns,
        }))
    }

    /// Runs the crawl to completion: spawns `worker_count` pipelined
    /// workers, waits for either the frontier to drain naturally or
    /// `Ctrl-C`, then joins outstanding asset downloads and commits the
    /// checkpoint before returning final stats (spec.md §4.7 termination).
    pub async fn run(self: Arc<Self>, worker_count: usize) -> Result<Stats, CrawlError> {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut workers = JoinSet::new();
        for _ in 0..worker_count.max(1) {
            let scheduler = self.clone();
            let shutdown_rx = shutdown_tx.subscribe();
            workers.spawn(async move { scheduler.worker_loop(shutdown_rx).await });
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received, winding down");
            }
            _ = async { while workers.join_next().await.is_some() {} } => {
                info!("frontier drained, all workers idle");
            }
        }

        let _ = shutdown_tx.send(());
        while workers.join_next().await.is_some() {}

        info!("joining outstanding asset downloads");
        self.assets.join_all().await;

        if let Err(e) = self.commit_checkpoint().await {
            error!(error = %e, "final checkpoint commit failed");
            return Err(e);
        }
        self.checkpoint.close().await?;

        let stats = self.stats.lock().await.clone();
        self.plugins.post_crawl(&stats).await;
        Ok(stats)
    }

    async fn worker_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let item = tokio::select! {
                biased;
                _ = shutdown.recv() => None,
                popped = self.frontier.pop() => popped,
            };
            let Some(item) = item else { break };

            self.in_flight.fetch_add(1, Ordering::SeqCst);
            self.process_item(item).await;
            let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;

            // Three-way close guard (spec.md §4.6): only safe once no worker
            // is mid-flight (so no more pushes can occur) and the queue is
            // empty (so there's nothing left to hand out).
            if remaining == 0 && self.frontier.is_empty() {
                self.frontier.close();
            }
        }
    }

    async fn process_item(&self, item: FrontierItem) {
        let url = item.url.clone();
        let Ok(parsed) = Url::parse(&url) else {
            warn!(url, "frontier item carries an unparsable url, dropping");
            return;
        };
        let host = parsed.host_str().unwrap_or("").to_string();

        if let Some(max) = self.config.crawling.max_pages {
            if self.pages_done.load(Ordering::SeqCst) >= max {
                debug!(url, "max_pages reached, skipping");
                return;
            }
        }
        if !self.domain_allowed(&host) {
            debug!(url, host, "domain not in allowed_domains, skipping");
            return;
        }
        if item.depth > self.config.crawling.depth_limit {
            debug!(url, depth = item.depth, "depth limit exceeded, skipping");
            return;
        }
        if !self.include_patterns.is_empty() && !self.include_patterns.matches_any(&url) {
            debug!(url, "no include pattern matched, skipping");
            return;
        }
        if self.exclude_patterns.matches_any(&url) {
            debug!(url, "exclude pattern matched, skipping");
            return;
        }

        match self.should_refetch(&url).await {
            Ok(false) => {
                self.stats.lock().await.skipped_existing += 1;
                debug!(url, "checkpoint says fresh, skipping");
                return;
            }
            Ok(true) => {}
            Err(e) => warn!(url, error = %e, "checkpoint freshness check failed, fetching anyway"),
        }

        if self.config.crawling.respect_robots_txt && !self.robots.is_allowed(&parsed).await {
            self.stats.lock().await.record_error(ErrorKind::RobotsBlocked);
            debug!(url, "robots.txt disallows fetch, skipping");
            return;
        }

        // Fixed acquisition order (spec.md §4.7 step 3) prevents deadlock:
        // global gate, then per-domain gate, then the rate limiter.
        let Ok(_global_permit) = self.global_semaphore.clone().acquire_owned().await else {
            return;
        };
        let domain_sem = self.domain_semaphore(&host).await;
        let Ok(_domain_permit) = domain_sem.acquire_owned().await else {
            return;
        };
        self.rate_limiter.acquire(&host).await;

        let resp = match self.fetcher.fetch(&url).await {
            Ok(resp) => resp,
            Err(e) => {
                let mut stats = self.stats.lock().await;
                stats.pages_failed += 1;
                stats.record_error(e.kind());
                warn!(url, error = %e, "fetch failed");
                return;
            }
        };

        self.plugins.post_fetch(&url, &resp.body, resp.status).await;

        let is_html = resp
            .content_type
            .as_deref()
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(true);

        if is_html {
            if let Ok(final_url) = Url::parse(&resp.final_url) {
                self.discover_links(&item, &final_url, &resp.body).await;
                if self.config.assets.download {
                    for asset in extract_assets(&resp.body, &final_url, &self.config.assets.types) {
                        self.assets.submit(asset.url).await;
                    }
                }
            } else {
                warn!(url = resp.final_url, "fetched page has an unparsable final url, skipping link/asset extraction");
            }
        }

        let markdown = match self.converter.convert(&resp.body) {
            Ok(md) => md,
            Err(e) => {
                warn!(url, error = %e, "markdown conversion failed");
                self.stats.lock().await.record_error(ErrorKind::ParseError);
                return;
            }
        };
        let markdown = self.plugins.post_convert(&url, markdown).await;

        let file_path = self.docs_mapper.path_for(&resp.final_url).with_extension("md");
        if let Err(e) = self.writer.write(&file_path, &markdown).await {
            warn!(url, error = %e, "failed to write converted output");
            self.stats.lock().await.record_error(ErrorKind::CheckpointError);
            return;
        }
        self.plugins.post_save(&file_path.to_string_lossy(), "markdown").await;

        let page = PageCheckpoint {
            url: resp.final_url.clone(),
            content_hash: compute_content_hash(&resp.body),
            last_scraped: Utc::now(),
            status_code: resp.status,
            file_path: file_path.to_string_lossy().into_owned(),
        };
        if let Err(e) = self.checkpoint.add_page(&page).await {
            warn!(url, error = %e, "failed to record checkpoint page");
            self.stats.lock().await.record_error(ErrorKind::CheckpointError);
        }

        self.stats.lock().await.pages_crawled += 1;
        let done = self.pages_done.fetch_add(1, Ordering::SeqCst) + 1;

        if done % CHECKPOINT_COMMIT_INTERVAL == 0 {
            if let Err(e) = self.commit_checkpoint().await {
                error!(error = %e, "periodic checkpoint commit failed");
            }
        }
        if let Some(max) = self.config.crawling.max_pages {
            if done >= max {
                info!(max, "max_pages reached, closing frontier");
                self.frontier.close();
            }
        }
    }

    async fn discover_links(&self, parent: &FrontierItem, final_url: &Url, html: &str) {
        if parent.depth >= self.config.crawling.depth_limit {
            return;
        }
        let links = extract_links(html, final_url, &self.config.crawling.link_selectors);
        let next_depth = parent.depth + 1;
        let referrer = Some(final_url.to_string());
        let batch = links
            .into_iter()
            .map(|link_url| FrontierItem { url: link_url, referrer: referrer.clone(), depth: next_depth });
        let enqueued = self.frontier.push_batch(batch);
        if enqueued > 0 {
            debug!(url = %final_url, enqueued, "links enqueued");
        }
    }

    async fn should_refetch(&self, url: &str) -> Result<bool, CrawlError> {
        if !self.config.cache.enabled || self.force_refetch_all {
            return Ok(true);
        }
        let ttl_days = self.config.cache.ttl_seconds.map(|secs| (secs as f64 / 86_400.0).ceil() as u64);
        self.checkpoint.should_redownload(url, ttl_days).await
    }

    fn domain_allowed(&self, host: &str) -> bool {
        if self.config.site.allowed_domains.is_empty() {
            return true;
        }
        self.config
            .site
            .allowed_domains
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
    }

    async fn domain_semaphore(&self, host: &str) -> Arc<Semaphore> {
        let mut map = self.domain_semaphores.lock().await;
        map.entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.crawling.per_domain_concurrent_requests.max(1))))
            .clone()
    }

    async fn commit_checkpoint(&self) -> Result<(), CrawlError> {
        let stats_snapshot = self.stats.lock().await.clone();
        let metadata = CheckpointMetadata {
            version: 1,
            config_name: self.config.name.clone(),
            config_hash: self.config_hash.clone(),
            created_at: self.created_at,
            last_updated: Utc::now(),
            stats: stats_snapshot,
        };
        self.checkpoint.save_metadata(&metadata).await?;
        self.checkpoint.save_queue(&self.frontier.snapshot()).await?;
        self.checkpoint.commit().await
    }
}

fn mb_to_bytes(mb: f64) -> u64 {
    (mb * 1024.0 * 1024.0).round() as u64
}
