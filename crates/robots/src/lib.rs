//! Robots.txt fetching, caching, and permission checks (spec.md §4.3).
//!
//! Uses the `robotstxt` crate's `DefaultMatcher` rather than hand-parsing
//! the directive syntax. Caches one fetch per origin per process, reused
//! across every page on that host.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use robotstxt::DefaultMatcher;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

struct CachedRobots {
    body: String,
    fetched_at: Instant,
}

/// A process-lifetime cache of robots.txt bodies, one per origin.
pub struct RobotsCache {
    client: reqwest::Client,
    user_agent: String,
    ttl: Option<Duration>,
    entries: Mutex<HashMap<String, CachedRobots>>,
}

impl RobotsCache {
    pub fn new(client: reqwest::Client, user_agent: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn origin_key(url: &Url) -> Option<String> {
        let host = url.host_str()?;
        Some(match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        })
    }

    /// Fetches (or reuses a cached copy of) `url`'s origin's robots.txt and
    /// reports whether `user_agent` may fetch `url`. A robots.txt that
    /// can't be retrieved (404, timeout, connection failure) is treated as
    /// permissive — absence of a policy is not a denial.
    pub async fn is_allowed(&self, url: &Url) -> bool {
        let Some(origin) = Self::origin_key(url) else {
            return true;
        };

        let body = self.fetch_cached(&origin).await;
        let Some(body) = body else {
            return true;
        };

        DefaultMatcher::default().one_agent_allowed_by_robots(&body, &self.user_agent, url.as_str())
    }

    async fn fetch_cached(&self, origin: &str) -> Option<String> {
        {
            let entries = self.entries.lock().await;
            if let Some(cached) = entries.get(origin) {
                let fresh = self.ttl.map(|ttl| cached.fetched_at.elapsed() < ttl).unwrap_or(true);
                if fresh {
                    return Some(cached.body.clone());
                }
            }
        }

        let robots_url = format!("{origin}/robots.txt");
        let body = match self
            .client
            .get(&robots_url)
            .timeout(ROBOTS_FETCH_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            Ok(resp) => {
                debug!(origin, status = %resp.status(), "no robots.txt, treating as permissive");
                String::new()
            }
            Err(err) => {
                warn!(origin, error = %err, "failed to fetch robots.txt, treating as permissive");
                String::new()
            }
        };

        let mut entries = self.entries.lock().await;
        entries.insert(
            origin.to_string(),
            CachedRobots { body: body.clone(), fetched_at: Instant::now() },
        );
        Some(body)
    }
}
