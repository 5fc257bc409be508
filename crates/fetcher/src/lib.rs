//! HTTP fetching: retries, redirect handling, and size guards (spec.md §4.5).
//!
//! A thin wrapper around a configured `reqwest::Client` returning a uniform
//! response struct. Redirects are followed manually, one hop at a time via
//! `reqwest::redirect::Policy::none()`, so cycles and the hop cap can be
//! enforced; unparseable `Content-Length` headers are ignored rather than
//! treated as errors.

use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use rand::Rng;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use sus_core::CrawlError;

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub max_retries: u32,
    pub retry_backoff: f64,
    pub retry_jitter: f64,
    pub max_redirects: u32,
    pub max_page_size_bytes: Option<u64>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "sus-crawler/0.1".to_string(),
            max_retries: 3,
            retry_backoff: 2.0,
            retry_jitter: 0.3,
            max_redirects: 10,
            max_page_size_bytes: Some(10 * 1024 * 1024),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub requested_url: String,
    pub final_url: String,
    pub status: u16,
    pub body: String,
    pub content_type: Option<String>,
}

/// Wraps a configured `reqwest::Client` with the crawler's fetch semantics.
/// One `Fetcher` is shared across all scheduler workers.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CrawlError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Fetches `url`, following redirects (up to `max_redirects`, erroring
    /// on a revisited URL) and retrying transient failures with jittered
    /// exponential backoff. `Retry-After` is honored when present.
    pub async fn fetch(&self, url: &str) -> Result<FetchResponse, CrawlError> {
        let requested = Url::parse(url).map_err(|e| CrawlError::InvalidUrl(e.to_string()))?;
        match requested.scheme() {
            "http" | "https" => {}
            other => return Err(CrawlError::UnsupportedScheme(other.to_string())),
        }

        let mut current = requested.clone();
        let mut visited = vec![current.to_string()];

        for hop in 0..=self.config.max_redirects {
            let resp = self.fetch_with_retries(&current).await?;

            if resp.status().is_redirection() {
                if hop == self.config.max_redirects {
                    return Err(CrawlError::TooManyRedirects {
                        url: requested.to_string(),
                        max: self.config.max_redirects,
                    });
                }
                let Some(location) = resp.headers().get(reqwest::header::LOCATION) else {
                    return self.materialize(requested.as_str(), current.as_str(), resp).await;
                };
                let location = location.to_str().unwrap_or_default();
                let next = current
                    .join(location)
                    .map_err(|e| CrawlError::Parse(format!("invalid redirect location: {e}")))?;
                let next_str = next.to_string();
                if visited.contains(&next_str) {
                    return Err(CrawlError::TooManyRedirects {
                        url: requested.to_string(),
                        max: self.config.max_redirects,
                    });
                }
                visited.push(next_str);
                current = next;
                continue;
            }

            return self.materialize(requested.as_str(), current.as_str(), resp).await;
        }

        Err(CrawlError::TooManyRedirects { url: requested.to_string(), max: self.config.max_redirects })
    }

    async fn materialize(
        &self,
        requested_url: &str,
        final_url: &str,
        resp: reqwest::Response,
    ) -> Result<FetchResponse, CrawlError> {
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            return Err(CrawlError::HttpError { url: final_url.to_string(), status: status.as_u16() });
        }

        self.check_content_length(resp.headers())?;
        let bytes = self.read_body_capped(resp).await?;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        Ok(FetchResponse {
            requested_url: requested_url.to_string(),
            final_url: final_url.to_string(),
            status: status.as_u16(),
            body,
            content_type,
        })
    }

    fn check_content_length(&self, headers: &reqwest::header::HeaderMap) -> Result<(), CrawlError> {
        let Some(max) = self.config.max_page_size_bytes else { return Ok(()) };
        let Some(raw) = headers.get(reqwest::header::CONTENT_LENGTH) else { return Ok(()) };
        // Malformed Content-Length headers (non-numeric, negative, chunked
        // markers) are ignored rather than treated as errors — the body is
        // still capped during the actual read below.
        let Ok(text) = raw.to_str() else { return Ok(()) };
        let Ok(size) = text.parse::<u64>() else { return Ok(()) };
        if size > max {
            return Err(CrawlError::FileTooLarge { size, max });
        }
        Ok(())
    }

    async fn read_body_capped(&self, resp: reqwest::Response) -> Result<Bytes, CrawlError> {
        let Some(max) = self.config.max_page_size_bytes else {
            return resp.bytes().await.map_err(|e| CrawlError::Network(e.to_string()));
        };

        let mut stream = resp.bytes_stream();
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CrawlError::Network(e.to_string()))?;
            buf.extend_from_slice(&chunk);
            if buf.len() as u64 > max {
                return Err(CrawlError::FileTooLarge { size: buf.len() as u64, max });
            }
        }
        Ok(Bytes::from(buf))
    }

    async fn fetch_with_retries(&self, url: &Url) -> Result<reqwest::Response, CrawlError> {
        let mut attempt = 0;
        loop {
            let outcome = self.client.get(url.clone()).send().await;
            match outcome {
                Ok(resp) if !should_retry(resp.status()) || attempt >= self.config.max_retries => {
                    return Ok(resp);
                }
                Ok(resp) => {
                    let wait = retry_after(&resp).unwrap_or_else(|| self.backoff_duration(attempt));
                    warn!(url = %url, status = %resp.status(), attempt, "retrying after transient status");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) if attempt >= self.config.max_retries => {
                    return Err(if err.is_timeout() {
                        CrawlError::Timeout(self.config.request_timeout)
                    } else {
                        CrawlError::Network(err.to_string())
                    });
                }
                Err(err) => {
                    debug!(url = %url, error = %err, attempt, "retrying after transport error");
                    tokio::time::sleep(self.backoff_duration(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    fn backoff_duration(&self, attempt: u32) -> Duration {
        let base = self.config.retry_backoff.max(1.0).powi(attempt as i32);
        let jitter_frac = if self.config.retry_jitter > 0.0 {
            rand::thread_rng().gen_range(-self.config.retry_jitter..=self.config.retry_jitter)
        } else {
            0.0
        };
        Duration::from_secs_f64((base * (1.0 + jitter_frac)).max(0.0))
    }
}

fn should_retry(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

fn retry_after(resp: &reqwest::Response) -> Option<Duration> {
    let header = resp.headers().get(reqwest::header::RETRY_AFTER)?;
    let seconds: u64 = header.to_str().ok()?.parse().ok()?;
    Some(Duration::from_secs(seconds))
}
