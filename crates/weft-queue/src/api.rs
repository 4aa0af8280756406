//! The external partitioned queue interface.
//!
//! The fabric consumes a FIFO queue service through this trait; the real
//! deployment binds it to a managed queue, tests and the single-node dev
//! deployment use [`InMemoryQueue`](crate::InMemoryQueue).

use async_trait::async_trait;
use std::time::Duration;

use crate::error::QueueResult;

/// One entry of a batch send.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    /// Serialized message body.
    pub body: String,
    /// FIFO partition key.
    pub partition_key: String,
    /// Deduplication id within the queue's dedup window.
    pub dedup_id: String,
}

/// Outcome of a batch send. Entries fail individually.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Number of entries the queue accepted.
    pub sent: usize,
    /// Indices (into the submitted batch) and reasons of failed entries.
    pub failed: Vec<(usize, String)>,
}

/// A message handed to a consumer. Deleting it requires the receipt
/// handle, which is only valid until the visibility timeout expires.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    /// Serialized message body.
    pub body: String,
    /// Handle for the follow-up delete.
    pub receipt_handle: String,
}

/// Approximate depth counters of one queue.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct QueueAttributes {
    /// Messages available for receive.
    #[serde(rename = "approxMessages")]
    pub approx_messages: u64,
    /// Messages in flight (received, not yet deleted).
    #[serde(rename = "approxNotVisible")]
    pub approx_not_visible: u64,
    /// Messages in a delay period.
    #[serde(rename = "approxDelayed")]
    pub approx_delayed: u64,
}

/// A partitioned FIFO queue service.
///
/// Semantics the fabric relies on:
/// - per-partition FIFO ordering of accepted sends
/// - at-least-once delivery with a visibility timeout
/// - deduplication by `dedup_id` within the service's dedup window
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Resolve a queue name to its URL.
    ///
    /// # Errors
    ///
    /// [`QueueError::NotFound`](crate::QueueError::NotFound) if the queue
    /// does not exist; callers treat this as retryable.
    async fn get_url(&self, name: &str) -> QueueResult<String>;

    /// Publish one message.
    ///
    /// # Errors
    ///
    /// [`QueueError::Send`](crate::QueueError::Send) on rejection.
    async fn send(
        &self,
        url: &str,
        body: String,
        partition_key: &str,
        dedup_id: &str,
    ) -> QueueResult<()>;

    /// Publish up to the service's batch limit of messages in one call.
    ///
    /// # Errors
    ///
    /// Errors only when the whole call fails; per-entry failures are
    /// reported in the [`BatchResult`].
    async fn send_batch(&self, url: &str, entries: Vec<BatchEntry>) -> QueueResult<BatchResult>;

    /// Long-poll for up to `max_messages` messages.
    ///
    /// Received messages become invisible to other consumers for
    /// `visibility_timeout`, then reappear unless deleted.
    ///
    /// # Errors
    ///
    /// [`QueueError::Receive`](crate::QueueError::Receive) on transport
    /// failure; an empty `Vec` is a normal long-poll timeout.
    async fn receive(
        &self,
        url: &str,
        max_messages: u32,
        wait_time: Duration,
        visibility_timeout: Duration,
    ) -> QueueResult<Vec<ReceivedMessage>>;

    /// Acknowledge (delete) a received message.
    ///
    /// Deleting with an expired receipt handle is a no-op; the message has
    /// already been redelivered.
    ///
    /// # Errors
    ///
    /// [`QueueError::Send`](crate::QueueError::Send) on transport failure.
    async fn delete(&self, url: &str, receipt_handle: &str) -> QueueResult<()>;

    /// Approximate depth counters.
    ///
    /// # Errors
    ///
    /// [`QueueError::NotFound`](crate::QueueError::NotFound) for an
    /// unknown URL.
    async fn get_attributes(&self, url: &str) -> QueueResult<QueueAttributes>;
}
