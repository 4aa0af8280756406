//! The asynchronous batch database writer.
//!
//! A bounded staging buffer in front of a single flusher task. `enqueue`
//! never blocks: a full buffer returns `false` and the caller leaves the
//! queue message unacked, so the external queue redelivers it once the
//! writer catches up. Flushes trigger on size or age, whichever comes
//! first.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use weft_config::BatchWriterSection;
use weft_core::QueueMessage;
use weft_telemetry::FabricMetrics;

use crate::deadletter::DeadLetterSink;
use crate::store::{MessageStore, activity_from};

/// How often the flusher polls its buffer.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Bound on the shutdown drain.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

/// Staging buffer and flusher for batched persistence.
pub struct BatchWriter {
    tx: mpsc::Sender<QueueMessage>,
    capacity: usize,
    metrics: Arc<FabricMetrics>,
    shutdown: CancellationToken,
    flusher: Mutex<Option<Flusher>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BatchWriter {
    /// Create a writer over `store`, diverting failed batches to `sink`.
    ///
    /// The config is validated at startup (`size <= buffer_capacity`);
    /// the writer trusts it here.
    #[must_use]
    pub fn new(
        store: Arc<dyn MessageStore>,
        sink: Arc<DeadLetterSink>,
        config: &BatchWriterSection,
        metrics: Arc<FabricMetrics>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer_capacity);
        let flusher = Flusher {
            rx,
            gauge_tx: tx.clone(),
            capacity: config.buffer_capacity,
            store,
            sink,
            batch_size: config.size,
            flush_interval: Duration::from_millis(config.flush_ms),
            metrics: Arc::clone(&metrics),
        };
        Self {
            tx,
            capacity: config.buffer_capacity,
            metrics,
            shutdown: CancellationToken::new(),
            flusher: Mutex::new(Some(flusher)),
            handle: Mutex::new(None),
        }
    }

    /// Start the flusher task.
    pub fn start(&self) {
        let Some(flusher) = self.flusher.lock().unwrap_or_else(|e| e.into_inner()).take()
        else {
            warn!("batch writer already started");
            return;
        };
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            info!("batch writer started");
            flusher.run(shutdown).await;
            info!("batch writer stopped");
        });
        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Offer a message to the staging buffer.
    ///
    /// Returns `false` when the buffer is full or the writer is shutting
    /// down; the caller must not ack the corresponding queue message.
    pub fn enqueue(&self, message: QueueMessage) -> bool {
        if self.shutdown.is_cancelled() {
            self.metrics.batch_writer.dropped.hit();
            return false;
        }
        match self.tx.try_send(message) {
            Ok(()) => {
                self.metrics.batch_writer.enqueued.hit();
                self.update_gauge();
                true
            },
            Err(mpsc::error::TrySendError::Full(_) | mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.batch_writer.dropped.hit();
                false
            },
        }
    }

    /// Stop accepting, drain the buffer, flush the final partial batch.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            match tokio::time::timeout(SHUTDOWN_WAIT, handle).await {
                Ok(Ok(())) => {},
                Ok(Err(_)) => warn!("batch writer task panicked during shutdown"),
                Err(_) => warn!("batch writer drain exceeded shutdown wait"),
            }
        }
    }

    fn update_gauge(&self) {
        let occupied = self.capacity.saturating_sub(self.tx.capacity());
        self.metrics.batch_writer.buffer_size.set(occupied as u64);
    }
}

impl std::fmt::Debug for BatchWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchWriter")
            .field("capacity", &self.capacity)
            .finish()
    }
}

struct Flusher {
    rx: mpsc::Receiver<QueueMessage>,
    gauge_tx: mpsc::Sender<QueueMessage>,
    capacity: usize,
    store: Arc<dyn MessageStore>,
    sink: Arc<DeadLetterSink>,
    batch_size: usize,
    flush_interval: Duration,
    metrics: Arc<FabricMetrics>,
}

impl Flusher {
    async fn run(mut self, shutdown: CancellationToken) {
        let mut pending: Vec<QueueMessage> = Vec::with_capacity(self.batch_size);
        let mut last_flush = Instant::now();

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                polled = tokio::time::timeout(POLL_INTERVAL, self.rx.recv()) => {
                    match polled {
                        Ok(Some(message)) => {
                            pending.push(message);
                            self.update_gauge();
                        },
                        Ok(None) => break,
                        Err(_) => {}, // poll timeout, fall through to the age check
                    }
                },
            }

            let due_by_size = pending.len() >= self.batch_size;
            let due_by_age =
                !pending.is_empty() && last_flush.elapsed() >= self.flush_interval;
            if due_by_size || due_by_age {
                self.flush(&mut pending).await;
                last_flush = Instant::now();
            }
        }

        // Orderly shutdown: drain whatever producers managed to enqueue,
        // then flush the final partial batch.
        while let Ok(message) = self.rx.try_recv() {
            pending.push(message);
            if pending.len() >= self.batch_size {
                self.flush(&mut pending).await;
            }
        }
        self.flush(&mut pending).await;
        self.update_gauge();
    }

    async fn flush(&self, pending: &mut Vec<QueueMessage>) {
        if pending.is_empty() {
            return;
        }
        let batch = std::mem::take(pending);
        self.metrics.batch_writer.batches.hit();

        match self.store.insert_messages(&batch).await {
            Ok(inserted) => {
                let records = activity_from(&inserted);
                match self.store.upsert_activity(&records).await {
                    Ok(()) => {
                        self.metrics.batch_writer.written.add(inserted.len() as u64);
                        debug!(
                            batch = batch.len(),
                            inserted = inserted.len(),
                            "batch flushed"
                        );
                    },
                    Err(e) => {
                        error!(error = %e, batch = batch.len(), "activity upsert failed");
                        self.metrics.batch_writer.write_errors.hit();
                        self.sink.ship(&batch, &e.to_string()).await;
                    },
                }
            },
            Err(e) => {
                error!(error = %e, batch = batch.len(), "batch insert failed");
                self.metrics.batch_writer.write_errors.hit();
                self.sink.ship(&batch, &e.to_string()).await;
            },
        }
    }

    fn update_gauge(&self) {
        let occupied = self.capacity.saturating_sub(self.gauge_tx.capacity());
        self.metrics.batch_writer.buffer_size.set(occupied as u64);
    }
}
