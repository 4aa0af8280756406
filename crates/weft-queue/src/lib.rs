//! Weft Queue - Partitioned queue plumbing for the weft chat message fabric.
//!
//! This crate provides:
//! - The [`MessageQueue`] trait the fabric consumes (FIFO partitions,
//!   visibility timeouts, dedup ids)
//! - An in-memory implementation with the same semantics, for tests and
//!   single-node deployments
//! - The [`QueueProducer`] (single-send and micro-batch modes)
//! - Lazy queue-URL resolution with per-entry retry
//! - The pure room-to-node partition assignment

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod api;
mod error;
mod memory;
mod partition;
mod producer;
mod urls;

pub use api::{BatchEntry, BatchResult, MessageQueue, QueueAttributes, ReceivedMessage};
pub use error::{QueueError, QueueResult};
pub use memory::InMemoryQueue;
pub use partition::assigned_rooms;
pub use producer::QueueProducer;
pub use urls::QueueUrlCache;
