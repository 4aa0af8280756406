//! Lock-free counter records for every pipeline component.
//!
//! Counters are plain relaxed atomics; export is a point-in-time snapshot.
//! The snapshot types serialize with the wire names the metrics endpoint
//! promises.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Increment by one.
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by `n`.
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A value that can move both ways (queue sizes, active workers).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    /// Increment by one.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement by one, saturating at zero.
    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
    }

    /// Overwrite the value.
    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters for the per-session write serializer.
#[derive(Debug, Default)]
pub struct WriteSerializerMetrics {
    /// Frames written to sockets.
    pub sent: Counter,
    /// Frames accepted onto a session queue.
    pub queued: Counter,
    /// Frames dropped (queue full, session closed, shutdown discard).
    pub dropped: Counter,
    /// Socket write errors.
    pub errors: Counter,
    /// Drain tasks currently writing.
    pub active_writers: Gauge,
}

impl WriteSerializerMetrics {
    /// Snapshot the counters.
    #[must_use]
    pub fn snapshot(&self) -> WriteSerializerSnapshot {
        WriteSerializerSnapshot {
            sent: self.sent.get(),
            queued: self.queued.get(),
            dropped: self.dropped.get(),
            errors: self.errors.get(),
            active_writers: self.active_writers.get(),
        }
    }
}

/// Serialized form of [`WriteSerializerMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct WriteSerializerSnapshot {
    /// Frames written to sockets.
    pub sent: u64,
    /// Frames accepted onto a session queue.
    pub queued: u64,
    /// Frames dropped.
    pub dropped: u64,
    /// Socket write errors.
    pub errors: u64,
    /// Drain tasks currently writing.
    #[serde(rename = "activeWriters")]
    pub active_writers: u64,
}

/// Counters for the batch database writer.
#[derive(Debug, Default)]
pub struct BatchWriterMetrics {
    /// Messages accepted into the buffer.
    pub enqueued: Counter,
    /// Rows written to the store.
    pub written: Counter,
    /// Flushes issued.
    pub batches: Counter,
    /// Messages rejected because the buffer was full.
    pub dropped: Counter,
    /// Failed flushes.
    pub write_errors: Counter,
    /// Current buffer occupancy.
    pub buffer_size: Gauge,
}

impl BatchWriterMetrics {
    /// Snapshot the counters.
    #[must_use]
    pub fn snapshot(&self) -> BatchWriterSnapshot {
        BatchWriterSnapshot {
            enqueued: self.enqueued.get(),
            written: self.written.get(),
            batches: self.batches.get(),
            dropped: self.dropped.get(),
            write_errors: self.write_errors.get(),
            buffer_size: self.buffer_size.get(),
        }
    }
}

/// Serialized form of [`BatchWriterMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct BatchWriterSnapshot {
    /// Messages accepted into the buffer.
    pub enqueued: u64,
    /// Rows written to the store.
    pub written: u64,
    /// Flushes issued.
    pub batches: u64,
    /// Messages rejected because the buffer was full.
    pub dropped: u64,
    /// Failed flushes.
    #[serde(rename = "writeErrors")]
    pub write_errors: u64,
    /// Current buffer occupancy.
    #[serde(rename = "bufferSize")]
    pub buffer_size: u64,
}

/// Counters for the dead-letter sink.
#[derive(Debug, Default)]
pub struct DeadLetterMetrics {
    /// Envelopes successfully published to the DLQ.
    pub shipped: Counter,
    /// Messages lost because the DLQ was disabled or its publish failed.
    pub lost: Counter,
}

impl DeadLetterMetrics {
    /// Snapshot the counters.
    #[must_use]
    pub fn snapshot(&self) -> DeadLetterSnapshot {
        DeadLetterSnapshot {
            shipped: self.shipped.get(),
            lost: self.lost.get(),
        }
    }
}

/// Serialized form of [`DeadLetterMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetterSnapshot {
    /// Envelopes successfully published to the DLQ.
    pub shipped: u64,
    /// Messages lost for good.
    pub lost: u64,
}

/// All counters of one fabric node.
///
/// Shared as a single `Arc` across every component; each component touches
/// only its own record.
#[derive(Debug, Default)]
pub struct FabricMetrics {
    /// Frames read from sockets.
    pub messages_received: Counter,
    /// Frames accepted and handed to the producer.
    pub messages_published: Counter,
    /// Frames rejected by validation or parsing.
    pub messages_failed: Counter,
    /// Acks enqueued to senders.
    pub acks_sent: Counter,
    /// Acks that could not be enqueued.
    pub acks_failed: Counter,
    /// Messages delivered to the external queue.
    pub queue_messages_sent: Counter,
    /// Messages the consumer pipeline completed.
    pub consumer_processed: Counter,
    /// Messages the consumer pipeline failed.
    pub consumer_failed: Counter,
    /// Broadcast deliveries enqueued.
    pub broadcast_success: Counter,
    /// Broadcast deliveries dropped or failed.
    pub broadcast_failures: Counter,
    /// Write serializer counters.
    pub write_serializer: WriteSerializerMetrics,
    /// Batch writer counters.
    pub batch_writer: BatchWriterMetrics,
    /// Dead-letter sink counters.
    pub dead_letter: DeadLetterMetrics,
}

impl FabricMetrics {
    /// Snapshot every counter.
    ///
    /// `active_rooms` and `total_sessions` come from the session registry,
    /// which owns that state.
    #[must_use]
    pub fn snapshot(&self, active_rooms: u64, total_sessions: u64) -> FabricSnapshot {
        FabricSnapshot {
            messages_received: self.messages_received.get(),
            messages_published: self.messages_published.get(),
            messages_failed: self.messages_failed.get(),
            acks_sent: self.acks_sent.get(),
            acks_failed: self.acks_failed.get(),
            queue_messages_sent: self.queue_messages_sent.get(),
            consumer_processed: self.consumer_processed.get(),
            consumer_failed: self.consumer_failed.get(),
            broadcast_success: self.broadcast_success.get(),
            broadcast_failures: self.broadcast_failures.get(),
            active_rooms,
            total_sessions,
            write_serializer: self.write_serializer.snapshot(),
            batch_writer: self.batch_writer.snapshot(),
            dead_letter: self.dead_letter.snapshot(),
        }
    }
}

/// Serialized form of [`FabricMetrics`], as served by the metrics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct FabricSnapshot {
    /// Frames read from sockets.
    #[serde(rename = "messagesReceived")]
    pub messages_received: u64,
    /// Frames accepted and handed to the producer.
    #[serde(rename = "messagesPublished")]
    pub messages_published: u64,
    /// Frames rejected by validation or parsing.
    #[serde(rename = "messagesFailed")]
    pub messages_failed: u64,
    /// Acks enqueued to senders.
    #[serde(rename = "acksSent")]
    pub acks_sent: u64,
    /// Acks that could not be enqueued.
    #[serde(rename = "acksFailed")]
    pub acks_failed: u64,
    /// Messages delivered to the external queue.
    #[serde(rename = "queueMessagesSent")]
    pub queue_messages_sent: u64,
    /// Messages the consumer pipeline completed.
    #[serde(rename = "consumerProcessed")]
    pub consumer_processed: u64,
    /// Messages the consumer pipeline failed.
    #[serde(rename = "consumerFailed")]
    pub consumer_failed: u64,
    /// Broadcast deliveries enqueued.
    #[serde(rename = "broadcastSuccess")]
    pub broadcast_success: u64,
    /// Broadcast deliveries dropped or failed.
    #[serde(rename = "broadcastFailures")]
    pub broadcast_failures: u64,
    /// Rooms with at least one live session on this node.
    #[serde(rename = "activeRooms")]
    pub active_rooms: u64,
    /// Live sessions on this node.
    #[serde(rename = "totalSessions")]
    pub total_sessions: u64,
    /// Write serializer counters.
    #[serde(rename = "writeSerializer")]
    pub write_serializer: WriteSerializerSnapshot,
    /// Batch writer counters.
    #[serde(rename = "batchWriter")]
    pub batch_writer: BatchWriterSnapshot,
    /// Dead-letter sink counters.
    #[serde(rename = "deadLetter")]
    pub dead_letter: DeadLetterSnapshot,
}
