//! The room-to-queue producer.
//!
//! Delivers accepted messages to the room's external queue partition.
//! Two modes:
//!
//! - **Single-send** (default): one synchronous publish per message; the
//!   caller sees the real outcome and reflects it in the client ack.
//! - **Micro-batch**: per-room bounded batches drained by a background
//!   scheduler. `publish` returns as soon as the message is staged, so
//!   the client ack is optimistic.
//!
//! In both modes the partition key is the room id and the dedup id is the
//! message id, which is what gives consumers per-room FIFO and the dedup
//! window its meaning.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use weft_config::{ProducerBatchSection, QueueSection};
use weft_core::{QueueMessage, RoomId};
use weft_telemetry::FabricMetrics;

use crate::api::{BatchEntry, MessageQueue};
use crate::error::{QueueError, QueueResult};
use crate::urls::QueueUrlCache;

/// Publishes queue messages to their room partitions.
pub struct QueueProducer {
    queue: Arc<dyn MessageQueue>,
    urls: Arc<QueueUrlCache>,
    naming: QueueSection,
    metrics: Arc<FabricMetrics>,
    batcher: Option<Batcher>,
}

struct Batcher {
    batches: Arc<DashMap<RoomId, Mutex<Vec<QueueMessage>>>>,
    capacity: usize,
    max_size: usize,
    flush_interval: Duration,
    kick: Arc<Notify>,
    shutdown: CancellationToken,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl QueueProducer {
    /// Create a producer. When `batch.enabled` the micro-batcher is
    /// configured but idle until [`start`](Self::start).
    #[must_use]
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        urls: Arc<QueueUrlCache>,
        naming: QueueSection,
        batch: &ProducerBatchSection,
        metrics: Arc<FabricMetrics>,
    ) -> Self {
        let batcher = batch.enabled.then(|| Batcher {
            batches: Arc::new(DashMap::new()),
            capacity: batch.capacity,
            max_size: batch.max_size,
            flush_interval: Duration::from_millis(batch.flush_ms),
            kick: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
            flusher: Mutex::new(None),
        });
        Self {
            queue,
            urls,
            naming,
            metrics,
            batcher,
        }
    }

    /// Start the micro-batch flusher. A no-op in single-send mode.
    pub fn start(&self) {
        let Some(batcher) = &self.batcher else {
            return;
        };

        let worker = FlushWorker {
            queue: Arc::clone(&self.queue),
            urls: Arc::clone(&self.urls),
            naming: self.naming.clone(),
            metrics: Arc::clone(&self.metrics),
            batches: Arc::clone(&batcher.batches),
            max_size: batcher.max_size,
        };
        let interval = batcher.flush_interval;
        let kick = Arc::clone(&batcher.kick);
        let shutdown = batcher.shutdown.clone();

        let handle = tokio::spawn(async move {
            info!("producer micro-batch flusher started");
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = kick.notified() => {},
                    () = tokio::time::sleep(interval) => {},
                }
                worker.flush_all().await;
            }
            // Final flush so staged messages survive an orderly shutdown.
            worker.flush_all().await;
            info!("producer micro-batch flusher stopped");
        });

        *batcher.flusher.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Stop the flusher, flushing staged batches first.
    pub async fn shutdown(&self) {
        let Some(batcher) = &self.batcher else {
            return;
        };
        batcher.shutdown.cancel();
        let handle = batcher
            .flusher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.await.is_err() {
                warn!("producer flusher task panicked during shutdown");
            }
        }
    }

    /// Publish a message to its room partition.
    ///
    /// # Errors
    ///
    /// In single-send mode, any queue failure surfaces here and the caller
    /// reports it to the sender. In micro-batch mode the only error is
    /// [`QueueError::BatchFull`]; acceptance into the batch is success.
    pub async fn publish(&self, message: &QueueMessage) -> QueueResult<()> {
        match &self.batcher {
            None => self.send_now(message).await,
            Some(batcher) => self.stage(batcher, message),
        }
    }

    async fn send_now(&self, message: &QueueMessage) -> QueueResult<()> {
        let name = self.naming.queue_name(message.room_id);
        let url = self
            .urls
            .get(&name)
            .await
            .ok_or(QueueError::NotFound(name))?;
        let body = serde_json::to_string(message)
            .map_err(|e| QueueError::Send(format!("serialize: {e}")))?;

        self.queue
            .send(
                &url,
                body,
                &message.room_id.to_string(),
                &message.message_id.to_string(),
            )
            .await?;
        self.metrics.queue_messages_sent.hit();
        Ok(())
    }

    fn stage(&self, batcher: &Batcher, message: &QueueMessage) -> QueueResult<()> {
        let entry = batcher
            .batches
            .entry(message.room_id)
            .or_insert_with(|| Mutex::new(Vec::new()));
        let mut batch = entry.value().lock().unwrap_or_else(|e| e.into_inner());

        if batch.len() >= batcher.capacity {
            return Err(QueueError::BatchFull(message.room_id));
        }
        batch.push(message.clone());
        let eager = batch.len() >= batcher.max_size;
        drop(batch);
        drop(entry);

        if eager {
            batcher.kick.notify_one();
        }
        Ok(())
    }
}

impl std::fmt::Debug for QueueProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueProducer")
            .field("mode", &if self.batcher.is_some() { "batch" } else { "single" })
            .finish()
    }
}

/// The flusher's working set, detached from the producer so the spawned
/// task owns everything it touches.
struct FlushWorker {
    queue: Arc<dyn MessageQueue>,
    urls: Arc<QueueUrlCache>,
    naming: QueueSection,
    metrics: Arc<FabricMetrics>,
    batches: Arc<DashMap<RoomId, Mutex<Vec<QueueMessage>>>>,
    max_size: usize,
}

impl FlushWorker {
    async fn flush_all(&self) {
        let rooms: Vec<RoomId> = self.batches.iter().map(|e| *e.key()).collect();
        for room in rooms {
            self.flush_room(room).await;
        }
    }

    async fn flush_room(&self, room: RoomId) {
        let staged: Vec<QueueMessage> = {
            let Some(entry) = self.batches.get(&room) else {
                return;
            };
            let mut batch = entry.value().lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *batch)
        };
        if staged.is_empty() {
            return;
        }

        let name = self.naming.queue_name(room);
        let Some(url) = self.urls.get(&name).await else {
            // Producer-side losses are final: count and move on.
            error!(room = %room, dropped = staged.len(), "queue URL unknown, dropping batch");
            self.metrics.messages_failed.add(staged.len() as u64);
            return;
        };

        for chunk in staged.chunks(self.max_size) {
            let mut entries = Vec::with_capacity(chunk.len());
            for message in chunk {
                match serde_json::to_string(message) {
                    Ok(body) => entries.push(BatchEntry {
                        body,
                        partition_key: room.to_string(),
                        dedup_id: message.message_id.to_string(),
                    }),
                    Err(e) => {
                        error!(room = %room, error = %e, "unserializable message dropped");
                        self.metrics.messages_failed.hit();
                    },
                }
            }
            if entries.is_empty() {
                continue;
            }
            let submitted = entries.len();

            match self.queue.send_batch(&url, entries).await {
                Ok(result) => {
                    self.metrics.queue_messages_sent.add(result.sent as u64);
                    if !result.failed.is_empty() {
                        warn!(
                            room = %room,
                            failed = result.failed.len(),
                            "partial batch failure, entries dropped"
                        );
                        self.metrics.messages_failed.add(result.failed.len() as u64);
                    }
                },
                Err(e) => {
                    error!(room = %room, dropped = submitted, error = %e, "batch send failed");
                    self.metrics.messages_failed.add(submitted as u64);
                },
            }
        }
        debug!(room = %room, "room batch flushed");
    }
}
