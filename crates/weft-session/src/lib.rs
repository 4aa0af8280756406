//! Weft Session - Sessions, fanout and write serialization for the weft
//! chat message fabric.
//!
//! This crate provides:
//! - [`Session`]: one live socket bound to a room, with its bounded write
//!   queue and work-in-progress counter
//! - [`SessionRegistry`]: the per-room set of live sessions with
//!   snapshot-based reads
//! - [`WriteSerializer`]: the shared drain pool guaranteeing a single
//!   concurrent writer per socket
//! - [`Broadcaster`]: best-effort room fanout of consumed messages

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod testing;

mod broadcaster;
mod registry;
mod serializer;
mod session;
mod sink;

pub use broadcaster::Broadcaster;
pub use registry::SessionRegistry;
pub use serializer::{SendOutcome, WriteSerializer};
pub use session::Session;
pub use sink::{SessionSink, SinkError};
