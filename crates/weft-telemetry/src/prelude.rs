//! Prelude module - commonly used types for convenient import.
//!
//! Use `use weft_telemetry::prelude::*;` to import all essential types.

// Errors
pub use crate::{TelemetryError, TelemetryResult};

// Logging
pub use crate::{LogConfig, LogFormat, setup_logging};

// Metrics
pub use crate::{Counter, FabricMetrics, FabricSnapshot, Gauge};
