//! The single-writer invariant under fire: many concurrent producers,
//! one session, no overlapping socket writes, per-producer FIFO.

use std::sync::Arc;
use std::time::Duration;
use weft_core::RoomId;
use weft_session::testing::RecordingSink;
use weft_session::{Session, SessionRegistry, WriteSerializer};
use weft_telemetry::FabricMetrics;

fn harness(workers: usize, capacity: usize) -> (Arc<WriteSerializer>, Arc<Session>, Arc<RecordingSink>) {
    let registry = Arc::new(SessionRegistry::new());
    let metrics = Arc::new(FabricMetrics::default());
    let serializer = Arc::new(WriteSerializer::new(
        Arc::clone(&registry),
        workers,
        metrics,
    ));
    let sink = Arc::new(RecordingSink::new().with_delay(Duration::from_micros(20)));
    let session = Arc::new(Session::new(
        RoomId(1),
        "10.0.0.9:7000",
        capacity,
        Box::new(Arc::clone(&sink)),
    ));
    registry.add(Arc::clone(&session));
    (serializer, session, sink)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn thousand_concurrent_sends_never_overlap() {
    let (serializer, session, sink) = harness(16, 2000);

    let producers = 20;
    let per_producer = 50;
    let mut tasks = Vec::new();
    for p in 0..producers {
        let serializer = Arc::clone(&serializer);
        let session = Arc::clone(&session);
        tasks.push(tokio::spawn(async move {
            for i in 0..per_producer {
                serializer.send(&session, format!("{p}:{i}"));
                if i % 7 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Wait for the drain to finish delivering all 1,000 frames.
    for _ in 0..100 {
        if sink.frames().len() == producers * per_producer {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let frames = sink.frames();
    assert_eq!(frames.len(), producers * per_producer, "nothing dropped");
    assert!(!sink.overlapped(), "two writers touched the socket at once");

    // Per-producer submission order must survive the interleaving.
    for p in 0..producers {
        let prefix = format!("{p}:");
        let seen: Vec<usize> = frames
            .iter()
            .filter_map(|f| f.strip_prefix(&prefix))
            .map(|i| i.parse::<usize>().unwrap())
            .collect();
        let expected: Vec<usize> = (0..per_producer).collect();
        assert_eq!(seen, expected, "producer {p} frames reordered");
    }
}

#[tokio::test]
async fn sequential_sends_arrive_in_submission_order() {
    let (serializer, session, sink) = harness(4, 2000);

    for i in 0..1000 {
        serializer.send(&session, format!("{i}"));
    }
    for _ in 0..100 {
        if sink.frames().len() == 1000 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let frames = sink.frames();
    let parsed: Vec<usize> = frames.iter().map(|f| f.parse().unwrap()).collect();
    let expected: Vec<usize> = (0..1000).collect();
    assert_eq!(parsed, expected);
    assert!(!sink.overlapped());
}
