//! In-memory message store.
//!
//! Mirrors the relational contract: idempotent insert on message id and
//! accumulating activity upserts. Tests use the stall and failure knobs
//! to exercise backpressure and dead-letter paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use weft_core::{MessageId, QueueMessage, RoomId};

use crate::error::{StorageError, StorageResult};
use crate::store::{MessageStore, UserActivityRecord};

/// One stored activity row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRow {
    /// Earliest recorded activity.
    pub first_activity: DateTime<Utc>,
    /// Latest recorded activity.
    pub last_activity: DateTime<Utc>,
    /// Total messages counted for this key.
    pub message_count: u64,
}

/// An in-memory store with the relational contract.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    messages: Mutex<HashMap<MessageId, QueueMessage>>,
    activity: Mutex<HashMap<(String, RoomId), ActivityRow>>,
    insert_delay: Mutex<Duration>,
    fail_inserts: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every insert, to simulate a slow database.
    pub fn set_insert_delay(&self, delay: Duration) {
        *self.insert_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Make every insert fail, to exercise the dead-letter path.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Number of stored messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether a message id is stored.
    #[must_use]
    pub fn contains(&self, id: MessageId) -> bool {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&id)
    }

    /// The activity row for a user/room key, if any.
    #[must_use]
    pub fn activity(&self, user_id: &str, room_id: RoomId) -> Option<ActivityRow> {
        self.activity
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(user_id.to_owned(), room_id))
            .cloned()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn insert_messages(
        &self,
        batch: &[QueueMessage],
    ) -> StorageResult<Vec<QueueMessage>> {
        let delay = *self.insert_delay.lock().unwrap_or_else(|e| e.into_inner());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StorageError::Database("insert failed".to_owned()));
        }

        let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        let mut inserted = Vec::new();
        for message in batch {
            if messages.contains_key(&message.message_id) {
                continue;
            }
            messages.insert(message.message_id, message.clone());
            inserted.push(message.clone());
        }
        Ok(inserted)
    }

    async fn upsert_activity(&self, records: &[UserActivityRecord]) -> StorageResult<()> {
        let mut activity = self.activity.lock().unwrap_or_else(|e| e.into_inner());
        for record in records {
            let key = (record.user_id.clone(), record.room_id);
            match activity.get_mut(&key) {
                Some(row) => {
                    row.last_activity = row.last_activity.max(record.last_activity);
                    row.message_count += record.message_count;
                },
                None => {
                    activity.insert(
                        key,
                        ActivityRow {
                            first_activity: record.first_activity,
                            last_activity: record.last_activity,
                            message_count: record.message_count,
                        },
                    );
                },
            }
        }
        Ok(())
    }
}
