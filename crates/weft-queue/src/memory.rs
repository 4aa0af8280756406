//! In-memory FIFO queue.
//!
//! Faithful to the external service's contract: per-queue FIFO,
//! at-least-once delivery via visibility timeouts, and deduplication by
//! dedup id within a window. Backs tests and the single-node dev
//! deployment.

use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use uuid::Uuid;

use async_trait::async_trait;

use crate::api::{BatchEntry, BatchResult, MessageQueue, QueueAttributes, ReceivedMessage};
use crate::error::{QueueError, QueueResult};

/// How long a dedup id suppresses duplicate sends.
const DEDUP_WINDOW: Duration = Duration::from_secs(300);

/// URL scheme of in-memory queues.
const URL_PREFIX: &str = "mem://";

#[derive(Debug)]
struct Stored {
    seq: u64,
    body: String,
}

#[derive(Debug)]
struct Invisible {
    stored: Stored,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct PartitionState {
    visible: VecDeque<Stored>,
    invisible: HashMap<String, Invisible>,
    dedup: HashMap<String, Instant>,
    seq: u64,
}

impl PartitionState {
    /// Move expired in-flight messages back to the head of the queue,
    /// oldest first, so redelivery preserves FIFO position.
    fn reclaim_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .invisible
            .iter()
            .filter(|(_, inv)| inv.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        let mut reclaimed: Vec<Stored> = expired
            .into_iter()
            .filter_map(|receipt| self.invisible.remove(&receipt))
            .map(|inv| inv.stored)
            .collect();
        reclaimed.sort_by_key(|s| std::cmp::Reverse(s.seq));
        for stored in reclaimed {
            self.visible.push_front(stored);
        }
    }

    fn is_duplicate(&mut self, dedup_id: &str, now: Instant) -> bool {
        self.dedup.retain(|_, seen| now.duration_since(*seen) < DEDUP_WINDOW);
        if self.dedup.contains_key(dedup_id) {
            return true;
        }
        self.dedup.insert(dedup_id.to_owned(), now);
        false
    }
}

#[derive(Debug, Default)]
struct Partition {
    state: Mutex<PartitionState>,
    notify: Notify,
}

/// An in-memory partitioned FIFO queue service.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    partitions: DashMap<String, Arc<Partition>>,
    fail_sends: AtomicBool,
}

impl InMemoryQueue {
    /// Create an empty service with no queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the named queue. Creating an existing queue is a no-op.
    pub fn create_queue(&self, name: &str) {
        self.partitions
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Partition::default()));
    }

    /// Make every subsequent send fail, to exercise producer and DLQ
    /// failure paths in tests.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    fn partition(&self, url: &str) -> QueueResult<Arc<Partition>> {
        let name = url
            .strip_prefix(URL_PREFIX)
            .ok_or_else(|| QueueError::NotFound(url.to_owned()))?;
        self.partitions
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| QueueError::NotFound(name.to_owned()))
    }

    fn push(&self, partition: &Partition, body: String, dedup_id: &str) {
        let now = Instant::now();
        {
            let mut state = partition.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.is_duplicate(dedup_id, now) {
                return;
            }
            state.seq += 1;
            let seq = state.seq;
            state.visible.push_back(Stored { seq, body });
        }
        partition.notify.notify_waiters();
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn get_url(&self, name: &str) -> QueueResult<String> {
        if self.partitions.contains_key(name) {
            Ok(format!("{URL_PREFIX}{name}"))
        } else {
            Err(QueueError::NotFound(name.to_owned()))
        }
    }

    async fn send(
        &self,
        url: &str,
        body: String,
        _partition_key: &str,
        dedup_id: &str,
    ) -> QueueResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(QueueError::Send("queue unavailable".to_owned()));
        }
        let partition = self.partition(url)?;
        self.push(&partition, body, dedup_id);
        Ok(())
    }

    async fn send_batch(&self, url: &str, entries: Vec<BatchEntry>) -> QueueResult<BatchResult> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(QueueError::Send("queue unavailable".to_owned()));
        }
        let partition = self.partition(url)?;
        let mut result = BatchResult::default();
        for entry in entries {
            self.push(&partition, entry.body, &entry.dedup_id);
            result.sent += 1;
        }
        Ok(result)
    }

    async fn receive(
        &self,
        url: &str,
        max_messages: u32,
        wait_time: Duration,
        visibility_timeout: Duration,
    ) -> QueueResult<Vec<ReceivedMessage>> {
        let partition = self.partition(url)?;
        let deadline = Instant::now() + wait_time;

        loop {
            let batch = {
                let now = Instant::now();
                let mut state = partition.state.lock().unwrap_or_else(|e| e.into_inner());
                state.reclaim_expired(now);

                let take = usize::try_from(max_messages).unwrap_or(usize::MAX);
                let mut batch = Vec::new();
                while batch.len() < take {
                    let Some(stored) = state.visible.pop_front() else {
                        break;
                    };
                    let receipt = Uuid::new_v4().to_string();
                    let body = stored.body.clone();
                    state.invisible.insert(
                        receipt.clone(),
                        Invisible {
                            stored,
                            visible_at: now + visibility_timeout,
                        },
                    );
                    batch.push(ReceivedMessage {
                        body,
                        receipt_handle: receipt,
                    });
                }
                batch
            };

            if !batch.is_empty() {
                return Ok(batch);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            tokio::select! {
                () = partition.notify.notified() => {},
                () = tokio::time::sleep(deadline - now) => {},
            }
        }
    }

    async fn delete(&self, url: &str, receipt_handle: &str) -> QueueResult<()> {
        let partition = self.partition(url)?;
        let mut state = partition.state.lock().unwrap_or_else(|e| e.into_inner());
        // An unknown handle means the visibility timeout already expired
        // and the message went back on the queue; delete is idempotent.
        state.invisible.remove(receipt_handle);
        Ok(())
    }

    async fn get_attributes(&self, url: &str) -> QueueResult<QueueAttributes> {
        let partition = self.partition(url)?;
        let mut state = partition.state.lock().unwrap_or_else(|e| e.into_inner());
        state.reclaim_expired(Instant::now());
        Ok(QueueAttributes {
            approx_messages: state.visible.len() as u64,
            approx_not_visible: state.invisible.len() as u64,
            approx_delayed: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(10);
    const VISIBILITY: Duration = Duration::from_millis(50);

    async fn queue_with(name: &str) -> (InMemoryQueue, String) {
        let queue = InMemoryQueue::new();
        queue.create_queue(name);
        let url = queue.get_url(name).await.unwrap();
        (queue, url)
    }

    #[tokio::test]
    async fn test_unknown_queue_not_found() {
        let queue = InMemoryQueue::new();
        assert!(matches!(
            queue.get_url("nope").await,
            Err(QueueError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fifo_order_preserved() {
        let (queue, url) = queue_with("rooms-1").await;
        for i in 0..5 {
            queue
                .send(&url, format!("m{i}"), "1", &format!("d{i}"))
                .await
                .unwrap();
        }
        let got = queue.receive(&url, 10, WAIT, VISIBILITY).await.unwrap();
        let bodies: Vec<_> = got.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_dedup_id_suppresses_duplicates() {
        let (queue, url) = queue_with("rooms-1").await;
        queue.send(&url, "a".into(), "1", "same").await.unwrap();
        queue.send(&url, "b".into(), "1", "same").await.unwrap();
        let got = queue.receive(&url, 10, WAIT, VISIBILITY).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].body, "a");
    }

    #[tokio::test]
    async fn test_undeleted_message_redelivered_in_order() {
        let (queue, url) = queue_with("rooms-1").await;
        queue.send(&url, "m0".into(), "1", "d0").await.unwrap();
        queue.send(&url, "m1".into(), "1", "d1").await.unwrap();

        let first = queue.receive(&url, 2, WAIT, VISIBILITY).await.unwrap();
        assert_eq!(first.len(), 2);
        // Ack only the second; the first must come back, ahead of nothing.
        queue.delete(&url, &first[1].receipt_handle).await.unwrap();

        tokio::time::sleep(VISIBILITY + Duration::from_millis(20)).await;
        let again = queue.receive(&url, 2, WAIT, VISIBILITY).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].body, "m0");
    }

    #[tokio::test]
    async fn test_deleted_message_stays_gone() {
        let (queue, url) = queue_with("rooms-1").await;
        queue.send(&url, "m0".into(), "1", "d0").await.unwrap();
        let got = queue.receive(&url, 1, WAIT, VISIBILITY).await.unwrap();
        queue.delete(&url, &got[0].receipt_handle).await.unwrap();

        tokio::time::sleep(VISIBILITY + Duration::from_millis(20)).await;
        let again = queue.receive(&url, 1, WAIT, VISIBILITY).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_attributes_track_visibility() {
        let (queue, url) = queue_with("rooms-1").await;
        queue.send(&url, "m0".into(), "1", "d0").await.unwrap();
        queue.send(&url, "m1".into(), "1", "d1").await.unwrap();

        let attrs = queue.get_attributes(&url).await.unwrap();
        assert_eq!(attrs.approx_messages, 2);
        assert_eq!(attrs.approx_not_visible, 0);

        let _got = queue.receive(&url, 1, WAIT, VISIBILITY).await.unwrap();
        let attrs = queue.get_attributes(&url).await.unwrap();
        assert_eq!(attrs.approx_messages, 1);
        assert_eq!(attrs.approx_not_visible, 1);
    }

    #[tokio::test]
    async fn test_failing_sends() {
        let (queue, url) = queue_with("rooms-1").await;
        queue.set_fail_sends(true);
        assert!(queue.send(&url, "m".into(), "1", "d").await.is_err());
        queue.set_fail_sends(false);
        assert!(queue.send(&url, "m".into(), "1", "d").await.is_ok());
    }

    #[tokio::test]
    async fn test_long_poll_wakes_on_send() {
        let (queue, url) = queue_with("rooms-1").await;
        let queue = Arc::new(queue);

        let receiver = {
            let queue = Arc::clone(&queue);
            let url = url.clone();
            tokio::spawn(async move {
                queue
                    .receive(&url, 1, Duration::from_secs(5), VISIBILITY)
                    .await
                    .unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        queue.send(&url, "late".into(), "1", "d0").await.unwrap();

        let got = receiver.await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].body, "late");
    }
}
