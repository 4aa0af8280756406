//! Configuration types for a weft node.

use serde::{Deserialize, Serialize};
use weft_core::NodeId;

/// Fully-merged configuration of one fabric node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    /// Node identity and fleet membership.
    pub node: NodeSection,
    /// External queue naming and URL discovery.
    pub queue: QueueSection,
    /// Consumer pool behavior.
    pub consumer: ConsumerSection,
    /// Micro-batch producer.
    pub producer_batch: ProducerBatchSection,
    /// Persistence batching.
    pub batch_writer: BatchWriterSection,
    /// Dead-letter queue.
    pub dlq: DlqSection,
    /// Shared write worker pool.
    pub write_serializer: WriteSerializerSection,
    /// Per-session backpressure.
    pub session: SessionSection,
    /// Broadcast fanout options.
    pub broadcast: BroadcastSection,
    /// HTTP/WebSocket listener.
    pub server: ServerSection,
    /// Relational store.
    pub database: DatabaseSection,
    /// Logging.
    pub logging: LoggingSection,
}

/// Node identity and fleet membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    /// Identity used by the partitioner and stamped into every message.
    pub node_id: String,
    /// All peer node ids; sorted on load. Empty disables partitioning.
    pub node_list: Vec<String>,
    /// Number of rooms (room ids are `1..=rooms`).
    pub rooms: u32,
}

impl NodeSection {
    /// The node id as the typed form used across the fabric.
    #[must_use]
    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.node_id.clone())
    }
}

/// External queue naming and URL discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSection {
    /// Queue name prefix; room `n` lives at `{prefix}{n}`.
    pub prefix: String,
    /// Whether queue names address FIFO partitions.
    pub fifo_enabled: bool,
    /// Retry interval for lazy queue-URL rediscovery, in milliseconds.
    pub url_retry_ms: u64,
}

impl QueueSection {
    /// Queue name for a room. FIFO queues carry the `.fifo` suffix the
    /// external service requires.
    #[must_use]
    pub fn queue_name(&self, room: weft_core::RoomId) -> String {
        if self.fifo_enabled {
            format!("{}{}.fifo", self.prefix, room)
        } else {
            format!("{}{}", self.prefix, room)
        }
    }
}

/// Consumer pool behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerSection {
    /// Upper bound on consumer workers; actual pool size is
    /// `min(threads, assigned rooms)`.
    pub threads: usize,
    /// Max messages per receive call.
    pub max_messages: u32,
    /// Long-poll wait, in seconds.
    pub wait_time_secs: u64,
    /// Visibility timeout for received messages, in seconds.
    pub visibility_timeout_secs: u64,
}

/// Micro-batch producer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerBatchSection {
    /// Enable the micro-batcher. When disabled every publish is a
    /// synchronous single send.
    pub enabled: bool,
    /// Bound of each room's in-memory batch.
    pub capacity: usize,
    /// Max entries per batch send call (the external queue's limit).
    pub max_size: usize,
    /// Scheduler flush interval, in milliseconds.
    pub flush_ms: u64,
}

/// Persistence batching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchWriterSection {
    /// Flush when the pending batch reaches this many messages.
    pub size: usize,
    /// Flush a non-empty pending batch after this long, in milliseconds.
    pub flush_ms: u64,
    /// Bound of the writer's staging buffer.
    pub buffer_capacity: usize,
}

/// Dead-letter queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqSection {
    /// Ship failed batches to the DLQ. When disabled, failures are logged
    /// and counted as lost.
    pub enabled: bool,
    /// Name of the DLQ queue.
    pub queue_name: String,
}

/// Shared write worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteSerializerSection {
    /// Number of concurrent drain workers shared by all sessions.
    pub worker_threads: usize,
}

/// Per-session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    /// Bound of each session's outbound write queue.
    pub write_queue_capacity: usize,
}

/// Broadcast fanout options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastSection {
    /// Skip sessions whose user id equals the sender's.
    pub exclude_sender: bool,
}

/// HTTP/WebSocket listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Bind address, `host:port`.
    pub bind: String,
}

/// Relational store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Connection URL. Empty means no store: messages flow but nothing is
    /// persisted.
    #[serde(default)]
    pub url: String,
}

impl DatabaseSection {
    /// Whether a store is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty()
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Base level filter.
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}
