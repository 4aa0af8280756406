//! The store used when no database is configured.
//!
//! Accepts everything and keeps nothing, so the rest of the pipeline
//! (acks, broadcasts, queue deletes) behaves identically with or without
//! a database behind it.

use async_trait::async_trait;

use weft_core::QueueMessage;

use crate::error::StorageResult;
use crate::store::{MessageStore, UserActivityRecord};

/// A no-op message store.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl NullStore {
    /// Create a null store.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageStore for NullStore {
    async fn insert_messages(
        &self,
        batch: &[QueueMessage],
    ) -> StorageResult<Vec<QueueMessage>> {
        Ok(batch.to_vec())
    }

    async fn upsert_activity(&self, _records: &[UserActivityRecord]) -> StorageResult<()> {
        Ok(())
    }
}
