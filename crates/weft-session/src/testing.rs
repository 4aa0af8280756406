//! Mock sinks for tests.
//!
//! [`RecordingSink`] captures every frame and detects overlapping writes,
//! which is how the single-writer invariant is asserted. Shared here so
//! integration tests can drive the full pipeline without sockets.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::sink::{SessionSink, SinkError};

/// A sink that records frames and flags concurrent writers.
#[derive(Debug, Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<String>>,
    active: AtomicUsize,
    overlapped: AtomicBool,
    delay: Option<Duration>,
}

impl RecordingSink {
    /// Create a sink with no write delay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every write, to widen race windows.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Everything written so far, in write order.
    #[must_use]
    pub fn frames(&self) -> Vec<String> {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whether two writes were ever in flight at once.
    #[must_use]
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionSink for RecordingSink {
    async fn send_text(&self, frame: String) -> Result<(), SinkError> {
        if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(frame);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SessionSink for std::sync::Arc<RecordingSink> {
    async fn send_text(&self, frame: String) -> Result<(), SinkError> {
        self.as_ref().send_text(frame).await
    }
}

/// A sink whose writes always fail, for dead-transport paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSink;

#[async_trait]
impl SessionSink for FailingSink {
    async fn send_text(&self, _frame: String) -> Result<(), SinkError> {
        Err(SinkError("connection reset".to_owned()))
    }
}
