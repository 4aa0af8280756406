//! The partitioned queue consumer pool.
//!
//! Each assigned room is long-polled by exactly one worker; rooms are
//! spread round-robin over a fixed-size pool so a node owning many rooms
//! does not spawn a task per room. A received message is broadcast,
//! handed to the batch writer and only then acknowledged; every failure
//! leaves it on the queue for redelivery after the visibility timeout.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use weft_config::{ConsumerSection, QueueSection};
use weft_core::{QueueMessage, RoomId};
use weft_queue::{MessageQueue, QueueUrlCache, ReceivedMessage};
use weft_session::Broadcaster;
use weft_storage::BatchWriter;
use weft_telemetry::FabricMetrics;

/// Idle sleep between sweeps when no room produced anything.
const IDLE_SLEEP: Duration = Duration::from_millis(100);

/// Long-polls the room queues this node owns.
pub struct ConsumerPool {
    queue: Arc<dyn MessageQueue>,
    urls: Arc<QueueUrlCache>,
    naming: QueueSection,
    config: ConsumerSection,
    broadcaster: Arc<Broadcaster>,
    writer: Arc<BatchWriter>,
    metrics: Arc<FabricMetrics>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ConsumerPool {
    /// Create an idle pool; [`start`](Self::start) spawns the workers.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        urls: Arc<QueueUrlCache>,
        naming: QueueSection,
        config: ConsumerSection,
        broadcaster: Arc<Broadcaster>,
        writer: Arc<BatchWriter>,
        metrics: Arc<FabricMetrics>,
    ) -> Self {
        Self {
            queue,
            urls,
            naming,
            config,
            broadcaster,
            writer,
            metrics,
            shutdown: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn `min(threads, assigned rooms)` workers, each owning a
    /// disjoint round-robin slice of the assigned rooms.
    pub fn start(&self, assigned: &[RoomId]) {
        if assigned.is_empty() {
            info!("no rooms assigned; consumer pool idle");
            return;
        }
        let worker_count = self.config.threads.min(assigned.len());
        info!(
            workers = worker_count,
            rooms = assigned.len(),
            "starting consumer pool"
        );

        let mut handles = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        for index in 0..worker_count {
            let rooms: Vec<RoomId> = assigned
                .iter()
                .enumerate()
                .filter(|(i, _)| i % worker_count == index)
                .map(|(_, room)| *room)
                .collect();
            let worker = Worker {
                queue: Arc::clone(&self.queue),
                urls: Arc::clone(&self.urls),
                naming: self.naming.clone(),
                max_messages: self.config.max_messages,
                wait_time: Duration::from_secs(self.config.wait_time_secs),
                visibility_timeout: Duration::from_secs(self.config.visibility_timeout_secs),
                broadcaster: Arc::clone(&self.broadcaster),
                writer: Arc::clone(&self.writer),
                metrics: Arc::clone(&self.metrics),
            };
            let shutdown = self.shutdown.clone();
            handles.push(tokio::spawn(async move {
                debug!(worker = index, rooms = rooms.len(), "consumer worker started");
                worker.run(&rooms, shutdown).await;
                debug!(worker = index, "consumer worker stopped");
            }));
        }
    }

    /// Signal the workers and wait for them to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            workers.drain(..).collect()
        };
        for handle in handles {
            if handle.await.is_err() {
                warn!("consumer worker panicked during shutdown");
            }
        }
    }
}

impl std::fmt::Debug for ConsumerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerPool")
            .field("threads", &self.config.threads)
            .finish()
    }
}

struct Worker {
    queue: Arc<dyn MessageQueue>,
    urls: Arc<QueueUrlCache>,
    naming: QueueSection,
    max_messages: u32,
    wait_time: Duration,
    visibility_timeout: Duration,
    broadcaster: Arc<Broadcaster>,
    writer: Arc<BatchWriter>,
    metrics: Arc<FabricMetrics>,
}

impl Worker {
    async fn run(&self, rooms: &[RoomId], shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                return;
            }
            let mut produced = false;
            for room in rooms {
                if shutdown.is_cancelled() {
                    return;
                }
                produced |= self.poll_room(*room, &shutdown).await;
            }
            if !produced {
                tokio::select! {
                    () = shutdown.cancelled() => return,
                    () = tokio::time::sleep(IDLE_SLEEP) => {},
                }
            }
        }
    }

    /// Poll one room once. Returns whether any message arrived.
    async fn poll_room(&self, room: RoomId, shutdown: &CancellationToken) -> bool {
        let name = self.naming.queue_name(room);
        // A queue that does not resolve yet is skipped, not fatal; the
        // URL cache retries on its own schedule.
        let Some(url) = self.urls.get(&name).await else {
            return false;
        };

        let received = tokio::select! {
            () = shutdown.cancelled() => return false,
            received = self.queue.receive(
                &url,
                self.max_messages,
                self.wait_time,
                self.visibility_timeout,
            ) => received,
        };

        match received {
            Ok(messages) => {
                let produced = !messages.is_empty();
                for message in messages {
                    self.process(&url, message).await;
                }
                produced
            },
            Err(e) => {
                warn!(room = %room, error = %e, "receive failed");
                self.metrics.consumer_failed.hit();
                false
            },
        }
    }

    async fn process(&self, url: &str, received: ReceivedMessage) {
        let message: QueueMessage = match serde_json::from_str(&received.body) {
            Ok(message) => message,
            Err(e) => {
                // Unparseable payload: leave it for redelivery rather
                // than guessing; operators see the counter climb.
                error!(error = %e, "undeserializable queue message");
                self.metrics.consumer_failed.hit();
                return;
            },
        };

        // Fanout is best-effort; persistence decides the ack.
        self.broadcaster.broadcast(&message);

        if self.writer.enqueue(message) {
            match self.queue.delete(url, &received.receipt_handle).await {
                Ok(()) => self.metrics.consumer_processed.hit(),
                Err(e) => {
                    warn!(error = %e, "delete failed; message will be redelivered");
                    self.metrics.consumer_failed.hit();
                },
            }
        } else {
            // Buffer full: no ack, the queue redelivers after the
            // visibility timeout.
            debug!("batch writer rejected message; leaving on queue");
            self.metrics.consumer_failed.hit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use weft_config::{BatchWriterSection, DlqSection};
    use weft_core::{ChatFrame, NodeId};
    use weft_queue::InMemoryQueue;
    use weft_session::testing::RecordingSink;
    use weft_session::{Session, SessionRegistry, WriteSerializer};
    use weft_storage::{DeadLetterSink, InMemoryStore};

    fn naming() -> QueueSection {
        QueueSection {
            prefix: "weft-room-".to_owned(),
            fifo_enabled: false,
            url_retry_ms: 60_000,
        }
    }

    fn consumer_section() -> ConsumerSection {
        ConsumerSection {
            threads: 2,
            max_messages: 10,
            wait_time_secs: 1,
            visibility_timeout_secs: 1,
        }
    }

    fn message(room: u32, text: &str) -> QueueMessage {
        let frame = ChatFrame {
            user_id: "42".to_owned(),
            username: "alice".to_owned(),
            message: text.to_owned(),
            timestamp: "2025-01-01T00:00:00Z".to_owned(),
            message_type: "TEXT".to_owned(),
        };
        QueueMessage::from_frame(&frame, RoomId(room), NodeId::new("node-a"), "10.0.0.1")
    }

    struct Fixture {
        pool: ConsumerPool,
        queue: Arc<InMemoryQueue>,
        store: Arc<InMemoryStore>,
        registry: Arc<SessionRegistry>,
        metrics: Arc<FabricMetrics>,
    }

    fn fixture(writer_section: &BatchWriterSection) -> Fixture {
        let queue = Arc::new(InMemoryQueue::new());
        queue.create_queue("weft-room-1");
        queue.create_queue("weft-db-failures");
        let store = Arc::new(InMemoryStore::new());
        let metrics = Arc::new(FabricMetrics::default());
        let registry = Arc::new(SessionRegistry::new());
        let serializer = Arc::new(WriteSerializer::new(
            Arc::clone(&registry),
            4,
            Arc::clone(&metrics),
        ));
        let urls = Arc::new(QueueUrlCache::new(
            Arc::clone(&queue) as Arc<dyn MessageQueue>,
            Duration::from_secs(60),
        ));
        let dead_letter = Arc::new(DeadLetterSink::new(
            Arc::clone(&queue) as Arc<dyn MessageQueue>,
            Arc::clone(&urls),
            &DlqSection {
                enabled: true,
                queue_name: "weft-db-failures".to_owned(),
            },
            Arc::clone(&metrics),
        ));
        let writer = Arc::new(BatchWriter::new(
            Arc::clone(&store) as Arc<dyn weft_storage::MessageStore>,
            dead_letter,
            writer_section,
            Arc::clone(&metrics),
        ));
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::clone(&registry),
            serializer,
            false,
            Arc::clone(&metrics),
        ));
        let pool = ConsumerPool::new(
            Arc::clone(&queue) as Arc<dyn MessageQueue>,
            urls,
            naming(),
            consumer_section(),
            broadcaster,
            Arc::clone(&writer),
            Arc::clone(&metrics),
        );
        writer.start();
        Fixture {
            pool,
            queue,
            store,
            registry,
            metrics,
        }
    }

    fn writer_section(size: usize, buffer: usize) -> BatchWriterSection {
        BatchWriterSection {
            size,
            flush_ms: 50,
            buffer_capacity: buffer,
        }
    }

    async fn publish(queue: &InMemoryQueue, msg: &QueueMessage) {
        let url = queue.get_url("weft-room-1").await.unwrap();
        queue
            .send(
                &url,
                serde_json::to_string(msg).unwrap(),
                "1",
                &msg.message_id.to_string(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_consume_broadcast_persist_ack() {
        let f = fixture(&writer_section(1, 100));
        let sink = Arc::new(RecordingSink::new());
        let session = Arc::new(Session::new(
            RoomId(1),
            "10.0.0.2:6000",
            100,
            Box::new(Arc::clone(&sink)),
        ));
        f.registry.add(session);

        let msg = message(1, "hello");
        publish(&f.queue, &msg).await;

        f.pool.start(&[RoomId(1)]);
        tokio::time::sleep(Duration::from_millis(400)).await;
        f.pool.shutdown().await;

        // Broadcast reached the room.
        let frames = sink.frames();
        assert_eq!(frames.len(), 1);
        let envelope: QueueMessage = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(envelope.message, "hello");

        // Persisted and acked: the queue is empty, the store is not.
        assert!(f.store.contains(msg.message_id));
        assert_eq!(f.metrics.consumer_processed.get(), 1);
        let url = f.queue.get_url("weft-room-1").await.unwrap();
        let attrs = f.queue.get_attributes(&url).await.unwrap();
        assert_eq!(attrs.approx_messages, 0);
        assert_eq!(attrs.approx_not_visible, 0);
    }

    #[tokio::test]
    async fn test_redelivered_message_persisted_once() {
        let f = fixture(&writer_section(1, 100));
        let msg = message(1, "dup");

        // Simulate queue redelivery: same body, distinct dedup ids so the
        // in-memory queue accepts both copies.
        let url = f.queue.get_url("weft-room-1").await.unwrap();
        for attempt in 0..2 {
            f.queue
                .send(
                    &url,
                    serde_json::to_string(&msg).unwrap(),
                    "1",
                    &format!("{}-{attempt}", msg.message_id),
                )
                .await
                .unwrap();
        }

        f.pool.start(&[RoomId(1)]);
        tokio::time::sleep(Duration::from_millis(400)).await;
        f.pool.shutdown().await;

        assert_eq!(f.store.message_count(), 1, "idempotent on message id");
        let row = f.store.activity("42", RoomId(1)).unwrap();
        assert_eq!(row.message_count, 1, "activity counted once");
    }

    #[tokio::test]
    async fn test_writer_rejection_leaves_message_on_queue() {
        // A writer that can hold one message and never flushes in time,
        // plus a stalled store, so the second message gets rejected.
        let f = fixture(&writer_section(1, 1));
        f.store.set_insert_delay(Duration::from_millis(500));

        publish(&f.queue, &message(1, "first")).await;
        publish(&f.queue, &message(1, "second")).await;
        publish(&f.queue, &message(1, "third")).await;

        f.pool.start(&[RoomId(1)]);
        tokio::time::sleep(Duration::from_millis(300)).await;
        f.pool.shutdown().await;

        let url = f.queue.get_url("weft-room-1").await.unwrap();
        let attrs = f.queue.get_attributes(&url).await.unwrap();
        let still_queued = attrs.approx_messages + attrs.approx_not_visible;
        assert!(
            still_queued >= 1,
            "rejected message must remain for redelivery"
        );
        assert!(f.metrics.batch_writer.dropped.get() >= 1);
    }

    #[tokio::test]
    async fn test_unknown_queue_url_is_skipped() {
        let f = fixture(&writer_section(1, 100));
        // Room 9 has no queue; the pool must keep running regardless.
        f.pool.start(&[RoomId(9)]);
        tokio::time::sleep(Duration::from_millis(200)).await;
        f.pool.shutdown().await;
        assert_eq!(f.metrics.consumer_processed.get(), 0);
    }
}
