//! Shared state behind every gateway handler.

use std::sync::Arc;
use std::time::Instant;

use weft_config::QueueSection;
use weft_core::NodeId;
use weft_queue::{MessageQueue, QueueProducer, QueueUrlCache};
use weft_session::{SessionRegistry, WriteSerializer};
use weft_telemetry::FabricMetrics;

/// Everything the ingress and metrics handlers need, wired explicitly at
/// startup.
pub struct GatewayState {
    /// This node's identity, stamped into accepted messages.
    pub node_id: NodeId,
    /// Number of rooms; the upgrade path rejects ids outside `1..=rooms`.
    pub rooms: u32,
    /// Live sessions.
    pub registry: Arc<SessionRegistry>,
    /// Outbound frame path.
    pub serializer: Arc<WriteSerializer>,
    /// Room-queue producer.
    pub producer: Arc<QueueProducer>,
    /// Queue service, for depth queries.
    pub queue: Arc<dyn MessageQueue>,
    /// Queue URL cache shared with the consumers.
    pub urls: Arc<QueueUrlCache>,
    /// Queue naming.
    pub naming: QueueSection,
    /// Per-session write queue bound.
    pub session_queue_capacity: usize,
    /// Counters.
    pub metrics: Arc<FabricMetrics>,
    /// Process start, for uptime reporting.
    pub started_at: Instant,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("node_id", &self.node_id)
            .field("rooms", &self.rooms)
            .finish()
    }
}
