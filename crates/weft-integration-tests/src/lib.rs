//! Shared fixture for the end-to-end pipeline tests.
//!
//! A [`TestNode`] is a full fabric node on in-memory backends: real
//! producer, consumers, batch writer and broadcaster, with sessions
//! attached through recording sinks instead of sockets.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![allow(clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use weft_config::FabricConfig;
use weft_core::RoomId;
use weft_queue::{InMemoryQueue, MessageQueue};
use weft_runtime::FabricRuntime;
use weft_session::testing::RecordingSink;
use weft_session::Session;
use weft_storage::{InMemoryStore, MessageStore};

/// A full in-process fabric node.
pub struct TestNode {
    /// The wired runtime.
    pub runtime: FabricRuntime,
    /// The queue backend, for direct inspection and fault injection.
    pub queue: Arc<InMemoryQueue>,
    /// The store backend, for direct inspection and fault injection.
    pub store: Arc<InMemoryStore>,
}

impl TestNode {
    /// Defaults tuned for tests: short polls and visibility timeouts so
    /// redelivery happens within a test's patience.
    pub fn test_config() -> FabricConfig {
        let mut config = weft_config::load(None).expect("defaults are valid");
        config.consumer.threads = 2;
        // Zero-wait receives: the sweep returns immediately on empty
        // rooms and the idle sleep paces the loop instead.
        config.consumer.wait_time_secs = 0;
        config.consumer.visibility_timeout_secs = 1;
        config.batch_writer.size = 10;
        config.batch_writer.flush_ms = 50;
        config.queue.url_retry_ms = 100;
        config
    }

    /// Build and start a node on fresh in-memory backends.
    pub fn start(config: FabricConfig) -> Self {
        let queue = Arc::new(InMemoryQueue::new());
        for room in 1..=config.node.rooms {
            queue.create_queue(&config.queue.queue_name(RoomId(room)));
        }
        queue.create_queue(&config.dlq.queue_name);
        let store = Arc::new(InMemoryStore::new());

        let runtime = FabricRuntime::new(
            config,
            Arc::clone(&queue) as Arc<dyn MessageQueue>,
            Arc::clone(&store) as Arc<dyn MessageStore>,
        );
        runtime.start();
        Self {
            runtime,
            queue,
            store,
        }
    }

    /// Attach a session to a room, as the ingress would on upgrade.
    pub fn connect(&self, room: u32) -> (Arc<Session>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let session = Arc::new(Session::new(
            RoomId(room),
            "10.0.0.9:7000",
            self.runtime.config().session.write_queue_capacity,
            Box::new(Arc::clone(&sink)),
        ));
        self.runtime.registry().add(Arc::clone(&session));
        (session, sink)
    }

    /// Feed one raw text frame through the ingress contract.
    pub async fn send_raw(&self, session: &Arc<Session>, text: &str) {
        let state = self.runtime.gateway();
        weft_gateway::process_frame(&state, session, text).await;
    }

    /// Feed a well-formed TEXT frame.
    pub async fn send_text(&self, session: &Arc<Session>, user_id: &str, text: &str) {
        let frame = format!(
            r#"{{"userId":"{user_id}","username":"alice","message":"{text}","timestamp":"2025-01-01T00:00:00Z","messageType":"TEXT"}}"#
        );
        self.send_raw(session, &frame).await;
    }

    /// Stop the node.
    pub async fn stop(&self) {
        self.runtime.stop().await;
    }
}

/// Sleep long enough for the async pipeline to settle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(400)).await;
}
