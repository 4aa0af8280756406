//! Weft Gateway - WebSocket ingress for the weft chat message fabric.
//!
//! This crate provides:
//! - The `/chat/{roomId}` WebSocket upgrade and per-connection read loop
//! - Frame validation, producer hand-off and the synchronous ack path
//! - The read-only `/healthz`, `/metrics` and `/metrics/queues` surface

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod ingress;
mod server;
mod state;

pub use error::{GatewayError, GatewayResult};
pub use ingress::process_frame;
pub use server::{router, serve};
pub use state::GatewayState;
