//! Node lifecycle: explicit construction and wiring of every component.
//!
//! No container magic: each component is built from its config section
//! and its collaborators, started in dependency order and stopped in
//! reverse. The queue and store backends are injected, which is also how
//! the test harnesses run the full pipeline in-process.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use weft_config::FabricConfig;
use weft_core::RoomId;
use weft_gateway::GatewayState;
use weft_queue::{MessageQueue, QueueProducer, QueueUrlCache, assigned_rooms};
use weft_session::{Broadcaster, SessionRegistry, WriteSerializer};
use weft_storage::{BatchWriter, DeadLetterSink, MessageStore};
use weft_telemetry::FabricMetrics;

use crate::consumer::ConsumerPool;
use crate::error::{RuntimeError, RuntimeResult};

/// One fabric node: ingress, producer, consumers, writer and fanout wired
/// together.
pub struct FabricRuntime {
    config: FabricConfig,
    metrics: Arc<FabricMetrics>,
    registry: Arc<SessionRegistry>,
    serializer: Arc<WriteSerializer>,
    producer: Arc<QueueProducer>,
    writer: Arc<BatchWriter>,
    consumers: ConsumerPool,
    gateway: Arc<GatewayState>,
    shutdown: CancellationToken,
    gateway_task: Mutex<Option<JoinHandle<()>>>,
}

impl FabricRuntime {
    /// Wire a node from its configuration and injected backends.
    #[must_use]
    pub fn new(
        config: FabricConfig,
        queue: Arc<dyn MessageQueue>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        let metrics = Arc::new(FabricMetrics::default());
        let registry = Arc::new(SessionRegistry::new());
        let serializer = Arc::new(WriteSerializer::new(
            Arc::clone(&registry),
            config.write_serializer.worker_threads,
            Arc::clone(&metrics),
        ));
        let urls = Arc::new(QueueUrlCache::new(
            Arc::clone(&queue),
            std::time::Duration::from_millis(config.queue.url_retry_ms),
        ));
        let producer = Arc::new(QueueProducer::new(
            Arc::clone(&queue),
            Arc::clone(&urls),
            config.queue.clone(),
            &config.producer_batch,
            Arc::clone(&metrics),
        ));
        let dead_letter = Arc::new(DeadLetterSink::new(
            Arc::clone(&queue),
            Arc::clone(&urls),
            &config.dlq,
            Arc::clone(&metrics),
        ));
        let writer = Arc::new(BatchWriter::new(
            store,
            dead_letter,
            &config.batch_writer,
            Arc::clone(&metrics),
        ));
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::clone(&registry),
            Arc::clone(&serializer),
            config.broadcast.exclude_sender,
            Arc::clone(&metrics),
        ));
        let consumers = ConsumerPool::new(
            Arc::clone(&queue),
            Arc::clone(&urls),
            config.queue.clone(),
            config.consumer.clone(),
            broadcaster,
            Arc::clone(&writer),
            Arc::clone(&metrics),
        );
        let gateway = Arc::new(GatewayState {
            node_id: config.node.node_id(),
            rooms: config.node.rooms,
            registry: Arc::clone(&registry),
            serializer: Arc::clone(&serializer),
            producer: Arc::clone(&producer),
            queue,
            urls,
            naming: config.queue.clone(),
            session_queue_capacity: config.session.write_queue_capacity,
            metrics: Arc::clone(&metrics),
            started_at: Instant::now(),
        });

        Self {
            config,
            metrics,
            registry,
            serializer,
            producer,
            writer,
            consumers,
            gateway,
            shutdown: CancellationToken::new(),
            gateway_task: Mutex::new(None),
        }
    }

    /// The rooms this node's consumers own under the current config.
    #[must_use]
    pub fn assigned_rooms(&self) -> Vec<RoomId> {
        assigned_rooms(
            &self.config.node.node_id(),
            &self.config.node.node_list,
            self.config.node.rooms,
        )
    }

    /// Start the pipeline: producer flusher, batch writer, consumers.
    pub fn start(&self) {
        info!(node = %self.config.node.node_id(), "starting fabric runtime");
        self.producer.start();
        self.writer.start();
        let assigned = self.assigned_rooms();
        info!(rooms = assigned.len(), "consuming assigned rooms");
        self.consumers.start(&assigned);
    }

    /// Bind the gateway listener and serve until stopped.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::BadBindAddress`] when the configured bind
    /// address does not parse (config validation makes this unreachable
    /// in practice).
    pub fn serve_gateway(&self) -> RuntimeResult<()> {
        let bind: SocketAddr = self
            .config
            .server
            .bind
            .parse()
            .map_err(|_| RuntimeError::BadBindAddress(self.config.server.bind.clone()))?;
        let state = Arc::clone(&self.gateway);
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = weft_gateway::serve(state, bind, shutdown).await {
                error!(error = %e, "gateway exited with error");
            }
        });
        *self.gateway_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Orderly shutdown: stop accepting, let consumers finish their
    /// current receive, flush the producer, drain the writer, then drop
    /// every session's queued frames.
    pub async fn stop(&self) {
        info!("stopping fabric runtime");
        self.shutdown.cancel();
        let gateway = self
            .gateway_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut handle) = gateway {
            // Graceful shutdown waits for in-flight connections, and open
            // sockets never finish; bound the wait and cut them off.
            if tokio::time::timeout(std::time::Duration::from_secs(2), &mut handle)
                .await
                .is_err()
            {
                warn!("gateway still has open connections; aborting listener");
                handle.abort();
            }
        }
        self.consumers.shutdown().await;
        self.producer.shutdown().await;
        self.writer.shutdown().await;
        self.serializer.shutdown();
        info!("fabric runtime stopped");
    }

    /// The gateway state, for harnesses that drive ingress in-process.
    #[must_use]
    pub fn gateway(&self) -> Arc<GatewayState> {
        Arc::clone(&self.gateway)
    }

    /// Node counters.
    #[must_use]
    pub fn metrics(&self) -> Arc<FabricMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Live session registry.
    #[must_use]
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// The node configuration.
    #[must_use]
    pub fn config(&self) -> &FabricConfig {
        &self.config
    }
}

impl std::fmt::Debug for FabricRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FabricRuntime")
            .field("node_id", &self.config.node.node_id)
            .field("rooms", &self.config.node.rooms)
            .finish()
    }
}
