//! Weft Runtime - Node lifecycle for the weft chat message fabric.
//!
//! This crate provides:
//! - The [`ConsumerPool`] long-polling this node's assigned room queues
//! - [`FabricRuntime`]: explicit wiring of every component with an
//!   ordered `start()`/`stop()` lifecycle

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod consumer;
mod error;
mod runtime;

pub use consumer::ConsumerPool;
pub use error::{RuntimeError, RuntimeResult};
pub use runtime::FabricRuntime;
