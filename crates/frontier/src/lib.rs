//! The deduplicated FIFO queue of URLs awaiting fetch (spec.md §4.6).
//!
//! A mutex-guarded queue plus a dedup set, with `pop` blocking until either
//! a new item arrives or the frontier is closed. One plain FIFO rather than
//! per-host priority queues — there's no priority concept here, every
//! request is HTTP(S), and dedup is exact rather than bloom-filter-
//! approximate, so the uniqueness invariant (spec.md §8) holds with no
//! false negatives.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use tokio::sync::Notify;
use tracing::debug;

use sus_core::{normalize, FrontierItem};

struct State {
    queue: VecDeque<FrontierItem>,
    seen: HashSet<String>,
    closed: bool,
}

/// A deduplicated FIFO queue of `(url, referrer, depth)` frontier items.
pub struct Frontier {
    state: Mutex<State>,
    notify: Notify,
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}

impl Frontier {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                seen: HashSet::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Marks `urls` as already seen without enqueuing them — used to seed
    /// dedup state from a checkpoint's known pages on resume, so already-
    /// fetched pages aren't re-discovered as "new" links.
    pub fn mark_seen(&self, urls: impl IntoIterator<Item = String>) {
        let mut state = self.state.lock().expect("frontier mutex poisoned");
        for url in urls {
            if let Ok(normalized) = normalize(&url) {
                state.seen.insert(normalized);
            }
        }
    }

    /// Enqueues `item`. Returns `false` if the normalized URL was already
    /// seen (in-flight, completed, or previously enqueued) or the frontier
    /// is closed; `true` if it was newly added.
    pub fn push(&self, mut item: FrontierItem) -> bool {
        let normalized = match normalize(&item.url) {
            Ok(u) => u,
            Err(_) => return false,
        };
        item.url = normalized.clone();

        let mut state = self.state.lock().expect("frontier mutex poisoned");
        if state.closed {
            return false;
        }
        if !state.seen.insert(normalized) {
            return false;
        }
        state.queue.push_back(item);
        drop(state);
        self.notify.notify_one();
        true
    }

    /// Enqueues every item in `items`, returning how many were newly added.
    pub fn push_batch(&self, items: impl IntoIterator<Item = FrontierItem>) -> usize {
        let mut added = 0;
        for item in items {
            if self.push(item) {
                added += 1;
            }
        }
        added
    }

    /// Pops the oldest queued item, blocking until one is available or the
    /// frontier is closed (in which case `None` is returned).
    pub async fn pop(&self) -> Option<FrontierItem> {
        loop {
            // Must create the Notified future before re-checking state: a
            // notify() between the check and the await would otherwise be
            // missed. tokio::sync::Notify guarantees a notify occurring
            // after this call (even before `.await`) is not lost.
            let notified = self.notify.notified();

            {
                let mut state = self.state.lock().expect("frontier mutex poisoned");
                if let Some(item) = state.queue.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Signals that no more items will ever be pushed. Wakes every blocked
    /// `pop` caller, which then observes an empty+closed queue and returns
    /// `None`. Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.state.lock().expect("frontier mutex poisoned");
            if state.closed {
                return;
            }
            state.closed = true;
        }
        debug!("frontier closed");
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().expect("frontier mutex poisoned").closed
    }

    /// Whether `url` (after normalization) has already been seen.
    pub fn seen(&self, url: &str) -> bool {
        match normalize(url) {
            Ok(normalized) => self.state.lock().expect("frontier mutex poisoned").seen.contains(&normalized),
            Err(_) => false,
        }
    }

    /// A point-in-time copy of everything still queued, for checkpoint
    /// persistence (spec.md §4.8 `save_queue`).
    pub fn snapshot(&self) -> Vec<FrontierItem> {
        self.state
            .lock()
            .expect("frontier mutex poisoned")
            .queue
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("frontier mutex poisoned").queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(url: &str, depth: u32) -> FrontierItem {
        FrontierItem { url: url.to_string(), referrer: None, depth }
    }

    #[test]
    fn push_dedups_by_normalized_url() {
        let f = Frontier::new();
        assert!(f.push(item("https://example.com/a", 0)));
        assert!(!f.push(item("https://EXAMPLE.com/a/", 0)));
        assert_eq!(f.len(), 1);
    }

    #[tokio::test]
    async fn pop_returns_pushed_items_fifo() {
        let f = Frontier::new();
        f.push(item("https://example.com/a", 0));
        f.push(item("https://example.com/b", 0));
        let first = f.pop().await.unwrap();
        let second = f.pop().await.unwrap();
        assert_eq!(first.url, "https://example.com/a");
        assert_eq!(second.url, "https://example.com/b");
    }

    #[tokio::test]
    async fn pop_blocks_until_push_then_unblocks() {
        use std::sync::Arc;
        use std::time::Duration;

        let f = Arc::new(Frontier::new());
        let f2 = f.clone();
        let handle = tokio::spawn(async move { f2.pop().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        f.push(item("https://example.com/a", 0));

        let popped = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("pop should unblock")
            .expect("task should not panic")
            .expect("item should be present");
        assert_eq!(popped.url, "https://example.com/a");
    }

    #[tokio::test]
    async fn close_unblocks_pending_pop_with_none() {
        use std::time::Duration;

        let f = std::sync::Arc::new(Frontier::new());
        let f2 = f.clone();
        let handle = tokio::spawn(async move { f2.pop().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        f.close();

        let popped = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("pop should unblock on close")
            .expect("task should not panic");
        assert!(popped.is_none());
    }

    #[test]
    fn closed_frontier_rejects_new_pushes() {
        let f = Frontier::new();
        f.close();
        assert!(!f.push(item("https://example.com/a", 0)));
    }

    #[test]
    fn depth_is_carried_through() {
        let f = Frontier::new();
        f.push(item("https://example.com/a", 3));
        let snap = f.snapshot();
        assert_eq!(snap[0].depth, 3);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Pushing the same (small) set of URLs any number of times, in
            // any order, never grows the frontier past the number of
            // distinct normalized URLs (spec.md §8's uniqueness invariant).
            #[test]
            fn push_never_exceeds_distinct_url_count(
                urls in prop::collection::vec(0usize..4, 1..20),
            ) {
                let pool = [
                    "https://example.com/a",
                    "https://example.com/b",
                    "https://EXAMPLE.com/a/",
                    "https://example.com/c",
                ];
                let f = Frontier::new();
                for idx in &urls {
                    f.push(item(pool[*idx], 0));
                }
                // "a" and its trailing-slash/case variant normalize the same.
                let distinct: std::collections::HashSet<&str> =
                    urls.iter().map(|&i| if i == 2 { "a" } else { pool[i] }).collect();
                prop_assert_eq!(f.len(), distinct.len());
            }
        }
    }
}
