//! Per-domain token-bucket rate limiting (spec.md §4.4).
//!
//! `tokens := min(burst, tokens + rate * Δt)`. Implemented on top of
//! `governor`'s keyed rate limiter (found across the pack's crawler/search
//! manifests, e.g. `Myrmecology-High-Performance-Web-Crawler-Search-Engine`
//! and `foofork-riptidecrawler`) rather than hand-rolling the bucket math:
//! `governor` already implements the GCRA algorithm that formula describes,
//! keyed per-domain via its `DefaultKeyedStateStore`.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter as GovernorLimiter};
use tracing::trace;

/// Requests-per-second / burst-size pair, derived from `CrawlingRules`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Seconds between requests at steady state. `0.0` effectively disables
    /// throttling (quota is clamped to at least 1 request/second).
    pub delay_between_requests: f64,
    pub burst_size: u32,
}

impl RateLimitConfig {
    fn quota(&self) -> Quota {
        let per_second = if self.delay_between_requests > 0.0 {
            (1.0 / self.delay_between_requests).max(0.001)
        } else {
            // No configured delay: allow a generous ceiling rather than an
            // unbounded rate, so a misconfigured 0.0 doesn't defeat the
            // per-domain semaphore entirely.
            1000.0
        };
        let burst = NonZeroU32::new(self.burst_size.max(1)).expect("clamped to >= 1");
        let rate = NonZeroU32::new(per_second.ceil() as u32).unwrap_or(burst);
        Quota::per_second(rate).allow_burst(burst)
    }
}

/// A keyed token-bucket limiter: one independent bucket per domain string.
pub struct DomainRateLimiter {
    inner: GovernorLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>,
    clock: DefaultClock,
}

impl DomainRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            inner: GovernorLimiter::dashmap(config.quota()),
            clock: DefaultClock::default(),
        }
    }

    /// Blocks until `domain`'s bucket has a token available, then consumes
    /// one. Never errors: a domain with no prior traffic simply gets a
    /// fresh bucket on first use.
    pub async fn acquire(&self, domain: &str) {
        loop {
            match self.inner.check_key(&domain.to_string()) {
                Ok(()) => {
                    trace!(domain, "rate limiter token acquired");
                    return;
                }
                Err(not_until) => {
                    let wait = not_until.wait_time_from(self.clock.now());
                    if wait > Duration::ZERO {
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }
    }
}

impl Default for DomainRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig { delay_between_requests: 0.0, burst_size: 10 })
    }
}

/// Shared handle suitable for cloning across scheduler worker tasks.
pub type SharedRateLimiter = Arc<DomainRateLimiter>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn burst_allows_immediate_requests_up_to_burst_size() {
        let limiter = DomainRateLimiter::new(RateLimitConfig {
            delay_between_requests: 1.0,
            burst_size: 3,
        });
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire("example.com").await;
        }
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn exceeding_burst_forces_a_wait() {
        let limiter = DomainRateLimiter::new(RateLimitConfig {
            delay_between_requests: 0.2,
            burst_size: 1,
        });
        limiter.acquire("example.com").await;
        let start = Instant::now();
        limiter.acquire("example.com").await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn domains_have_independent_buckets() {
        let limiter = DomainRateLimiter::new(RateLimitConfig {
            delay_between_requests: 0.5,
            burst_size: 1,
        });
        limiter.acquire("a.com").await;
        let start = Instant::now();
        limiter.acquire("b.com").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
