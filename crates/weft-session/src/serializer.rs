//! The write serializer: per-session FIFO with a shared drain pool.
//!
//! Socket writes are not reentrant, so every outbound frame goes through
//! a bounded per-session queue drained by at most one worker at a time.
//! The work-in-progress counter decides who schedules the drain: the
//! producer that moves it from zero. Workers come from a shared pool
//! rather than a task per session, so a node with tens of thousands of
//! idle sockets carries no idle writers.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, trace, warn};

use weft_telemetry::FabricMetrics;

use crate::registry::SessionRegistry;
use crate::session::Session;

/// What happened to a frame handed to [`WriteSerializer::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted onto the session's queue; a drain will deliver it.
    Queued,
    /// Dropped: the session is closed.
    DroppedClosed,
    /// Dropped: the session queue is at capacity (slow client).
    DroppedFull,
}

impl SendOutcome {
    /// Whether the frame was accepted.
    #[must_use]
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued)
    }
}

/// Shared-pool writer that serializes outbound frames per session.
pub struct WriteSerializer {
    registry: Arc<SessionRegistry>,
    workers: Arc<Semaphore>,
    metrics: Arc<FabricMetrics>,
}

impl WriteSerializer {
    /// Create a serializer with `worker_threads` concurrent drain slots.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        worker_threads: usize,
        metrics: Arc<FabricMetrics>,
    ) -> Self {
        Self {
            registry,
            workers: Arc::new(Semaphore::new(worker_threads)),
            metrics,
        }
    }

    /// Enqueue a frame for delivery to `session`.
    ///
    /// Never blocks. Dropping is the defined behavior for closed sessions
    /// and slow clients; every drop is counted.
    pub fn send(&self, session: &Arc<Session>, frame: String) -> SendOutcome {
        if !session.is_open() {
            self.metrics.write_serializer.dropped.hit();
            return SendOutcome::DroppedClosed;
        }
        if !session.offer(frame) {
            trace!(session = %session.id(), "session queue full, frame dropped");
            self.metrics.write_serializer.dropped.hit();
            return SendOutcome::DroppedFull;
        }
        self.metrics.write_serializer.queued.hit();

        if session.begin_work() == 0 {
            self.spawn_drain(Arc::clone(session));
        }
        SendOutcome::Queued
    }

    /// Close one session, discard its queued frames and prune it from the
    /// registry. Used by the ingress path when the read side ends.
    pub fn discard_session(&self, session: &Arc<Session>) {
        session.close();
        let discarded = session.discard_queue();
        if discarded > 0 {
            self.metrics
                .write_serializer
                .dropped
                .add(discarded as u64);
        }
        self.registry.remove(session);
    }

    /// Shut the pool down: no further drains run, and every queued frame
    /// on every session is discarded and counted.
    pub fn shutdown(&self) {
        self.workers.close();
        for session in self.registry.snapshot_all() {
            session.close();
            let discarded = session.discard_queue();
            if discarded > 0 {
                self.metrics
                    .write_serializer
                    .dropped
                    .add(discarded as u64);
            }
            self.registry.remove(&session);
        }
    }

    fn spawn_drain(&self, session: Arc<Session>) {
        let workers = Arc::clone(&self.workers);
        let registry = Arc::clone(&self.registry);
        let metrics = Arc::clone(&self.metrics);

        tokio::spawn(async move {
            let Ok(_permit) = workers.acquire_owned().await else {
                // Pool is shutting down; the queue is discarded there.
                return;
            };
            metrics.write_serializer.active_writers.inc();
            drain(&session, &registry, &metrics).await;
            metrics.write_serializer.active_writers.dec();
        });
    }
}

impl std::fmt::Debug for WriteSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteSerializer")
            .field("available_workers", &self.workers.available_permits())
            .finish()
    }
}

/// Drain one session's queue. Serialized per session by construction:
/// only the producer that moved the counter from zero schedules this, and
/// it runs until the counter is back to zero.
async fn drain(session: &Arc<Session>, registry: &SessionRegistry, metrics: &FabricMetrics) {
    let mut missed: usize = 1;
    loop {
        while let Some(frame) = session.pop() {
            if !session.is_open() {
                discard_and_unregister(session, registry, metrics);
                return;
            }
            if let Err(e) = session.write(frame).await {
                warn!(session = %session.id(), error = %e, "write failed, closing session");
                metrics.write_serializer.errors.hit();
                session.close();
                discard_and_unregister(session, registry, metrics);
                return;
            }
            metrics.write_serializer.sent.hit();
        }
        // Consume the work we observed; anything that arrived since keeps
        // this drain alive for another pass.
        missed = session.end_work(missed);
        if missed == 0 {
            return;
        }
    }
}

fn discard_and_unregister(
    session: &Arc<Session>,
    registry: &SessionRegistry,
    metrics: &FabricMetrics,
) {
    let discarded = session.discard_queue();
    if discarded > 0 {
        debug!(session = %session.id(), discarded, "queued frames discarded");
        metrics.write_serializer.dropped.add(discarded as u64);
    }
    registry.remove(session);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingSink, RecordingSink};
    use std::time::Duration;
    use weft_core::RoomId;

    fn serializer(workers: usize) -> (Arc<WriteSerializer>, Arc<SessionRegistry>, Arc<FabricMetrics>) {
        let registry = Arc::new(SessionRegistry::new());
        let metrics = Arc::new(FabricMetrics::default());
        let serializer = Arc::new(WriteSerializer::new(
            Arc::clone(&registry),
            workers,
            Arc::clone(&metrics),
        ));
        (serializer, registry, metrics)
    }

    fn session_with(
        registry: &SessionRegistry,
        capacity: usize,
        sink: Box<dyn crate::SessionSink>,
    ) -> Arc<Session> {
        let session = Arc::new(Session::new(RoomId(1), "10.0.0.1:5000", capacity, sink));
        registry.add(Arc::clone(&session));
        session
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_frames_delivered_in_order() {
        let (serializer, registry, metrics) = serializer(4);
        let sink = Arc::new(RecordingSink::new());
        let session = session_with(&registry, 100, Box::new(Arc::clone(&sink)));

        for i in 0..10 {
            assert!(serializer.send(&session, format!("f{i}")).is_queued());
        }
        settle().await;

        let frames = sink.frames();
        let expected: Vec<String> = (0..10).map(|i| format!("f{i}")).collect();
        assert_eq!(frames, expected);
        assert_eq!(metrics.write_serializer.sent.get(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_writer_under_concurrency() {
        let (serializer, registry, _metrics) = serializer(8);
        let sink = Arc::new(RecordingSink::new().with_delay(Duration::from_micros(50)));
        let session = session_with(&registry, 2000, Box::new(Arc::clone(&sink)));

        let mut tasks = Vec::new();
        for t in 0..10 {
            let serializer = Arc::clone(&serializer);
            let session = Arc::clone(&session);
            tasks.push(tokio::spawn(async move {
                for i in 0..100 {
                    serializer.send(&session, format!("t{t}-{i}"));
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(!sink.overlapped(), "two writers were active at once");
        assert_eq!(sink.frames().len(), 1000);
    }

    #[tokio::test]
    async fn test_per_producer_fifo() {
        let (serializer, registry, _metrics) = serializer(2);
        let sink = Arc::new(RecordingSink::new());
        let session = session_with(&registry, 2000, Box::new(Arc::clone(&sink)));

        for i in 0..200 {
            serializer.send(&session, format!("{i}"));
        }
        settle().await;

        let frames = sink.frames();
        let positions: Vec<usize> = frames
            .iter()
            .map(|f| f.parse::<usize>().unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted, "submission order violated");
    }

    #[tokio::test]
    async fn test_queue_full_drops_and_recovers() {
        let (serializer, registry, metrics) = serializer(1);
        // A sink slow enough that the queue stays full while we probe it.
        let sink = Arc::new(RecordingSink::new().with_delay(Duration::from_millis(30)));
        let session = session_with(&registry, 2, Box::new(Arc::clone(&sink)));

        // First frame starts draining (popped almost immediately), two
        // more fill the queue.
        serializer.send(&session, "a".into());
        tokio::time::sleep(Duration::from_millis(5)).await;
        serializer.send(&session, "b".into());
        serializer.send(&session, "c".into());
        let outcome = serializer.send(&session, "d".into());
        assert_eq!(outcome, SendOutcome::DroppedFull);
        assert!(metrics.write_serializer.dropped.get() >= 1);

        // After the drain catches up the queue accepts again.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(serializer.send(&session, "e".into()).is_queued());
    }

    #[tokio::test]
    async fn test_write_error_closes_and_unregisters() {
        let (serializer, registry, metrics) = serializer(2);
        let session = session_with(&registry, 100, Box::new(FailingSink));

        serializer.send(&session, "doomed".into());
        settle().await;

        assert!(!session.is_open());
        assert_eq!(registry.session_count(), 0, "session pruned on write error");
        assert_eq!(metrics.write_serializer.errors.get(), 1);
    }

    #[tokio::test]
    async fn test_send_to_closed_session_drops() {
        let (serializer, registry, metrics) = serializer(2);
        let sink = Arc::new(RecordingSink::new());
        let session = session_with(&registry, 100, Box::new(Arc::clone(&sink)));

        session.close();
        assert_eq!(
            serializer.send(&session, "x".into()),
            SendOutcome::DroppedClosed
        );
        assert_eq!(metrics.write_serializer.dropped.get(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_discards_queued_frames() {
        let (serializer, registry, metrics) = serializer(1);
        let sink = Arc::new(RecordingSink::new().with_delay(Duration::from_millis(50)));
        let session = session_with(&registry, 100, Box::new(Arc::clone(&sink)));

        for i in 0..5 {
            serializer.send(&session, format!("f{i}"));
        }
        serializer.shutdown();

        assert!(!session.is_open());
        assert_eq!(registry.session_count(), 0);
        assert!(metrics.write_serializer.dropped.get() > 0);
    }
}
