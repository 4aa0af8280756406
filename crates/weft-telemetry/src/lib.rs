//! Weft Telemetry - Logging and metrics for the weft chat message fabric.
//!
//! This crate provides:
//! - Configurable logging setup on top of the tracing ecosystem
//! - Compact lock-free counter records, one per pipeline component
//! - Read-only snapshots of all counters for the metrics HTTP surface
//!
//! Every failure path in the fabric increments a named counter here;
//! nothing is silently swallowed.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;
mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, setup_logging};
pub use metrics::{
    BatchWriterMetrics, BatchWriterSnapshot, Counter, DeadLetterMetrics, DeadLetterSnapshot,
    FabricMetrics, FabricSnapshot, Gauge, WriteSerializerMetrics, WriteSerializerSnapshot,
};
