//! Weft Config - Configuration for the weft chat message fabric.
//!
//! This crate provides:
//! - The [`FabricConfig`] type tree, one section per component
//! - Layered loading: embedded defaults → config file → `WEFT_*` env vars
//! - Startup validation of cross-field invariants
//!
//! Validation failures are fatal at startup; a node never runs with a
//! configuration it could not validate.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod loader;
mod types;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::load;
pub use types::{
    BatchWriterSection, BroadcastSection, ConsumerSection, DatabaseSection, DlqSection,
    FabricConfig, LoggingSection, NodeSection, ProducerBatchSection, QueueSection, ServerSection,
    SessionSection, WriteSerializerSection,
};
pub use validate::validate;
