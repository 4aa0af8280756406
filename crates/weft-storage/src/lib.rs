//! Weft Storage - Persistence layer for the weft chat message fabric.
//!
//! This crate provides:
//! - The two-statement [`MessageStore`] contract (idempotent batch insert,
//!   accumulating activity upsert)
//! - An in-memory store for tests and a null store for database-less
//!   deployments; a Postgres store behind the **`postgres`** feature
//! - The [`BatchWriter`]: bounded staging buffer + single flusher with
//!   size-or-age triggered flushes
//! - The [`DeadLetterSink`] for failed batches

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod deadletter;
mod error;
mod memory;
mod null;
mod store;
mod writer;

#[cfg(feature = "postgres")]
mod postgres;

pub use deadletter::DeadLetterSink;
pub use error::{StorageError, StorageResult};
pub use memory::{ActivityRow, InMemoryStore};
pub use null::NullStore;
pub use store::{MessageStore, UserActivityRecord, activity_from};
pub use writer::BatchWriter;

#[cfg(feature = "postgres")]
pub use postgres::PgMessageStore;
