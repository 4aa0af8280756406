//! The dead-letter sink for failed persistence batches.
//!
//! Each message of a failed batch is wrapped in a
//! [`DeadLetter`](weft_core::DeadLetter) envelope and published
//! individually to a dedicated queue, keyed by a fixed partition so
//! operators replay in one place. Nothing here consumes the DLQ; replay
//! is operator-driven.

use std::sync::Arc;
use tracing::{error, info};

use weft_config::DlqSection;
use weft_core::{DeadLetter, QueueMessage};
use weft_queue::{MessageQueue, QueueUrlCache};
use weft_telemetry::FabricMetrics;

/// Partition key of every DLQ entry.
const DLQ_PARTITION_KEY: &str = "database-failures";

/// Ships failed batches to the dead-letter queue.
pub struct DeadLetterSink {
    queue: Option<Arc<dyn MessageQueue>>,
    urls: Option<Arc<QueueUrlCache>>,
    queue_name: String,
    metrics: Arc<FabricMetrics>,
}

impl DeadLetterSink {
    /// Create a sink per the DLQ config. A disabled DLQ still constructs
    /// (null-object style): shipping then just logs and counts losses.
    #[must_use]
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        urls: Arc<QueueUrlCache>,
        config: &DlqSection,
        metrics: Arc<FabricMetrics>,
    ) -> Self {
        if config.enabled {
            Self {
                queue: Some(queue),
                urls: Some(urls),
                queue_name: config.queue_name.clone(),
                metrics,
            }
        } else {
            info!("dead-letter queue disabled; insert failures will be logged only");
            Self {
                queue: None,
                urls: None,
                queue_name: String::new(),
                metrics,
            }
        }
    }

    /// Ship a failed batch, one envelope per message.
    ///
    /// Failures here are terminal: the message is logged at error level
    /// and counted as lost.
    pub async fn ship(&self, batch: &[QueueMessage], reason: &str) {
        let url = match (&self.queue, &self.urls) {
            (Some(_), Some(urls)) => urls.get(&self.queue_name).await,
            _ => None,
        };

        for message in batch {
            let envelope = DeadLetter::new(message.clone(), reason, 1);
            match (&self.queue, &url) {
                (Some(queue), Some(url)) => {
                    let body = match serde_json::to_string(&envelope) {
                        Ok(body) => body,
                        Err(e) => {
                            error!(
                                message_id = %message.message_id,
                                error = %e,
                                "dead letter unserializable, message lost"
                            );
                            self.metrics.dead_letter.lost.hit();
                            continue;
                        },
                    };
                    match queue
                        .send(url, body, DLQ_PARTITION_KEY, &envelope.dedup_id())
                        .await
                    {
                        Ok(()) => self.metrics.dead_letter.shipped.hit(),
                        Err(e) => {
                            error!(
                                message_id = %message.message_id,
                                reason,
                                error = %e,
                                "dead letter publish failed, message lost"
                            );
                            self.metrics.dead_letter.lost.hit();
                        },
                    }
                },
                _ => {
                    error!(
                        message_id = %message.message_id,
                        reason,
                        "dead-letter queue unavailable, message lost"
                    );
                    self.metrics.dead_letter.lost.hit();
                },
            }
        }
    }
}

impl std::fmt::Debug for DeadLetterSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadLetterSink")
            .field("enabled", &self.queue.is_some())
            .field("queue_name", &self.queue_name)
            .finish()
    }
}
