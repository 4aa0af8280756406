//! Lazy queue-URL resolution with per-entry retry.
//!
//! Queue URLs are looked up on first need. A failed lookup is remembered
//! and not retried until the retry interval elapses, so a missing queue
//! for one room never turns into a hot loop and never affects other rooms.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::api::MessageQueue;

#[derive(Debug, Clone)]
struct CacheEntry {
    url: Option<String>,
    last_attempt: Instant,
}

/// Cache of queue-name → URL lookups.
pub struct QueueUrlCache {
    queue: Arc<dyn MessageQueue>,
    entries: DashMap<String, CacheEntry>,
    retry_interval: Duration,
}

impl QueueUrlCache {
    /// Create a cache resolving against `queue`, re-attempting failed
    /// lookups no more often than `retry_interval`.
    #[must_use]
    pub fn new(queue: Arc<dyn MessageQueue>, retry_interval: Duration) -> Self {
        Self {
            queue,
            entries: DashMap::new(),
            retry_interval,
        }
    }

    /// The URL for `name`, resolving it if due.
    ///
    /// Returns `None` while the queue is unknown and the last failure is
    /// still fresh; callers skip the queue and move on.
    pub async fn get(&self, name: &str) -> Option<String> {
        if let Some(entry) = self.entries.get(name) {
            if let Some(url) = &entry.url {
                return Some(url.clone());
            }
            if entry.last_attempt.elapsed() < self.retry_interval {
                return None;
            }
        }

        let resolved = self.queue.get_url(name).await;
        let now = Instant::now();
        match resolved {
            Ok(url) => {
                self.entries.insert(
                    name.to_owned(),
                    CacheEntry {
                        url: Some(url.clone()),
                        last_attempt: now,
                    },
                );
                Some(url)
            },
            Err(e) => {
                debug!(queue = name, error = %e, "queue URL not resolvable yet");
                self.entries.insert(
                    name.to_owned(),
                    CacheEntry {
                        url: None,
                        last_attempt: now,
                    },
                );
                None
            },
        }
    }
}

impl std::fmt::Debug for QueueUrlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueUrlCache")
            .field("entries", &self.entries.len())
            .field("retry_interval", &self.retry_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryQueue;

    #[tokio::test]
    async fn test_resolves_existing_queue() {
        let queue = Arc::new(InMemoryQueue::new());
        queue.create_queue("weft-room-1");
        let cache = QueueUrlCache::new(queue, Duration::from_secs(60));

        let url = cache.get("weft-room-1").await;
        assert_eq!(url.as_deref(), Some("mem://weft-room-1"));
    }

    #[tokio::test]
    async fn test_missing_queue_backs_off() {
        let queue = Arc::new(InMemoryQueue::new());
        let cache = QueueUrlCache::new(Arc::clone(&queue) as Arc<dyn MessageQueue>, Duration::from_secs(60));

        assert!(cache.get("weft-room-1").await.is_none());

        // The queue appears, but the failure is still fresh: not retried.
        queue.create_queue("weft-room-1");
        assert!(cache.get("weft-room-1").await.is_none());
    }

    #[tokio::test]
    async fn test_retry_after_interval() {
        let queue = Arc::new(InMemoryQueue::new());
        let cache = QueueUrlCache::new(
            Arc::clone(&queue) as Arc<dyn MessageQueue>,
            Duration::from_millis(20),
        );

        assert!(cache.get("weft-room-1").await.is_none());
        queue.create_queue("weft-room-1");

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("weft-room-1").await.is_some());
    }
}
