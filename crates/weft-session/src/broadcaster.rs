//! Room fanout of consumed queue messages.

use std::sync::Arc;
use tracing::{error, trace};

use weft_core::QueueMessage;
use weft_telemetry::FabricMetrics;

use crate::registry::SessionRegistry;
use crate::serializer::WriteSerializer;

/// Fans a queue message out to every live session in its room.
///
/// Serializes the envelope once, snapshots the room, and hands the frame
/// to the write serializer per session. Best-effort by design: a dead or
/// slow recipient affects nobody else, and there are no retries — the
/// sender was acked at ingress and the message is on its way to the
/// store.
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
    serializer: Arc<WriteSerializer>,
    exclude_sender: bool,
    metrics: Arc<FabricMetrics>,
}

impl Broadcaster {
    /// Create a broadcaster. With `exclude_sender`, sessions whose
    /// recorded user id matches the message's sender are skipped.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        serializer: Arc<WriteSerializer>,
        exclude_sender: bool,
        metrics: Arc<FabricMetrics>,
    ) -> Self {
        Self {
            registry,
            serializer,
            exclude_sender,
            metrics,
        }
    }

    /// Deliver `message` to its room. Returns how many sessions accepted
    /// the frame onto their queue.
    pub fn broadcast(&self, message: &QueueMessage) -> usize {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                error!(message_id = %message.message_id, error = %e, "unserializable broadcast");
                self.metrics.broadcast_failures.hit();
                return 0;
            },
        };

        let sessions = self.registry.snapshot_room(message.room_id);
        trace!(
            room = %message.room_id,
            recipients = sessions.len(),
            "broadcasting"
        );

        let mut delivered = 0;
        for session in sessions {
            if self.exclude_sender && session.user_id().as_deref() == Some(&message.user_id) {
                continue;
            }
            if self.serializer.send(&session, payload.clone()).is_queued() {
                self.metrics.broadcast_success.hit();
                delivered += 1;
            } else {
                self.metrics.broadcast_failures.hit();
            }
        }
        delivered
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("exclude_sender", &self.exclude_sender)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::testing::RecordingSink;
    use std::time::Duration;
    use weft_core::{ChatFrame, NodeId, RoomId};

    fn message(room: u32, user: &str) -> QueueMessage {
        let frame = ChatFrame {
            user_id: user.to_owned(),
            username: "alice".to_owned(),
            message: "hi".to_owned(),
            timestamp: "2025-01-01T00:00:00Z".to_owned(),
            message_type: "TEXT".to_owned(),
        };
        QueueMessage::from_frame(&frame, RoomId(room), NodeId::new("node-a"), "10.0.0.1")
    }

    struct Fixture {
        registry: Arc<SessionRegistry>,
        serializer: Arc<WriteSerializer>,
        metrics: Arc<FabricMetrics>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(SessionRegistry::new());
        let metrics = Arc::new(FabricMetrics::default());
        let serializer = Arc::new(WriteSerializer::new(
            Arc::clone(&registry),
            4,
            Arc::clone(&metrics),
        ));
        Fixture {
            registry,
            serializer,
            metrics,
        }
    }

    fn add_session(f: &Fixture, room: u32) -> (Arc<Session>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let session = Arc::new(Session::new(
            RoomId(room),
            "10.0.0.1:5000",
            100,
            Box::new(Arc::clone(&sink)),
        ));
        f.registry.add(Arc::clone(&session));
        (session, sink)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_whole_room_only() {
        let f = fixture();
        let (_s1, sink1) = add_session(&f, 7);
        let (_s2, sink2) = add_session(&f, 7);
        let (_s3, sink3) = add_session(&f, 8);

        let broadcaster = Broadcaster::new(
            Arc::clone(&f.registry),
            Arc::clone(&f.serializer),
            false,
            Arc::clone(&f.metrics),
        );
        let delivered = broadcaster.broadcast(&message(7, "42"));
        assert_eq!(delivered, 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink1.frames().len(), 1);
        assert_eq!(sink2.frames().len(), 1);
        assert!(sink3.frames().is_empty(), "other room untouched");

        let envelope: QueueMessage = serde_json::from_str(&sink1.frames()[0]).unwrap();
        assert_eq!(envelope.user_id, "42");
    }

    #[tokio::test]
    async fn test_sender_exclusion() {
        let f = fixture();
        let (sender, sender_sink) = add_session(&f, 7);
        let (_other, other_sink) = add_session(&f, 7);
        sender.set_user_id("42");

        let broadcaster = Broadcaster::new(
            Arc::clone(&f.registry),
            Arc::clone(&f.serializer),
            true,
            Arc::clone(&f.metrics),
        );
        let delivered = broadcaster.broadcast(&message(7, "42"));
        assert_eq!(delivered, 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(sender_sink.frames().is_empty(), "sender skipped");
        assert_eq!(other_sink.frames().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_recipient_counts_as_failure() {
        let f = fixture();
        let (dead, _sink) = add_session(&f, 7);
        let (_live, live_sink) = add_session(&f, 7);
        dead.close();

        let broadcaster = Broadcaster::new(
            Arc::clone(&f.registry),
            Arc::clone(&f.serializer),
            false,
            Arc::clone(&f.metrics),
        );
        let delivered = broadcaster.broadcast(&message(7, "42"));
        assert_eq!(delivered, 1, "only the live session accepted");
        assert_eq!(f.metrics.broadcast_failures.get(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(live_sink.frames().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_room_is_a_no_op() {
        let f = fixture();
        let broadcaster = Broadcaster::new(
            Arc::clone(&f.registry),
            Arc::clone(&f.serializer),
            false,
            Arc::clone(&f.metrics),
        );
        assert_eq!(broadcaster.broadcast(&message(7, "42")), 0);
    }
}
