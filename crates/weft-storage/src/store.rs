//! The relational store interface and the user-activity derivation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use weft_core::{QueueMessage, RoomId};

use crate::error::StorageResult;

/// One row of the user-activity rollup, derived per flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserActivityRecord {
    /// Sender user id.
    pub user_id: String,
    /// Room the activity happened in.
    pub room_id: RoomId,
    /// Earliest activity in this flush.
    pub first_activity: DateTime<Utc>,
    /// Latest activity in this flush.
    pub last_activity: DateTime<Utc>,
    /// Messages this user contributed to this flush.
    pub message_count: u64,
}

/// The two-statement contract with the relational store.
///
/// Both operations are batch-shaped; implementations coalesce them on the
/// wire. Inserts are idempotent on message id, which is what makes
/// at-least-once redelivery and partitioner handoffs benign.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a batch of messages, skipping ids already present.
    ///
    /// Returns the subset that was actually inserted; activity rollups
    /// are derived from that subset only, so a redelivered message never
    /// counts twice.
    ///
    /// # Errors
    ///
    /// Any failure fails the whole batch; the caller diverts it to the
    /// dead-letter sink.
    async fn insert_messages(&self, batch: &[QueueMessage])
    -> StorageResult<Vec<QueueMessage>>;

    /// Upsert user-activity rows.
    ///
    /// Store semantics: insert a new `(user_id, room_id)` row as-is; on
    /// conflict set `last_activity` to the max of existing and incoming
    /// and add the incoming `message_count` to the existing one.
    ///
    /// # Errors
    ///
    /// Any failure fails the whole batch.
    async fn upsert_activity(&self, records: &[UserActivityRecord]) -> StorageResult<()>;
}

/// Derive the activity rollup for a flush from its newly-inserted rows.
///
/// Deduplicates by `(user_id, room_id)`, accumulating the count and
/// keeping min/max timestamps. The result is ordered lexicographically by
/// key, so concurrent flushes acquire row locks in a consistent order and
/// cannot deadlock each other at the store.
#[must_use]
pub fn activity_from(messages: &[QueueMessage]) -> Vec<UserActivityRecord> {
    let mut by_key: BTreeMap<(String, RoomId), UserActivityRecord> = BTreeMap::new();

    for message in messages {
        let at = parse_timestamp(&message.timestamp);
        let key = (message.user_id.clone(), message.room_id);
        match by_key.get_mut(&key) {
            Some(record) => {
                record.first_activity = record.first_activity.min(at);
                record.last_activity = record.last_activity.max(at);
                record.message_count += 1;
            },
            None => {
                by_key.insert(
                    key,
                    UserActivityRecord {
                        user_id: message.user_id.clone(),
                        room_id: message.room_id,
                        first_activity: at,
                        last_activity: at,
                        message_count: 1,
                    },
                );
            },
        }
    }

    by_key.into_values().collect()
}

/// Server timestamps are stamped by this process and always parse; a
/// corrupt one falls back to now rather than poisoning the flush.
fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::{ChatFrame, NodeId};

    fn message(room: u32, user: &str, at: &str) -> QueueMessage {
        let frame = ChatFrame {
            user_id: user.to_owned(),
            username: "alice".to_owned(),
            message: "hi".to_owned(),
            timestamp: at.to_owned(),
            message_type: "TEXT".to_owned(),
        };
        let mut msg =
            QueueMessage::from_frame(&frame, RoomId(room), NodeId::new("node-a"), "10.0.0.1");
        msg.timestamp = at.to_owned();
        msg
    }

    #[test]
    fn test_activity_accumulates_per_key() {
        let batch = vec![
            message(1, "42", "2025-01-01T00:00:02Z"),
            message(1, "42", "2025-01-01T00:00:01Z"),
            message(1, "7", "2025-01-01T00:00:03Z"),
        ];
        let records = activity_from(&batch);
        assert_eq!(records.len(), 2);

        let alice = records.iter().find(|r| r.user_id == "42").unwrap();
        assert_eq!(alice.message_count, 2);
        assert_eq!(
            alice.first_activity,
            "2025-01-01T00:00:01Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(
            alice.last_activity,
            "2025-01-01T00:00:02Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn test_activity_sorted_by_key() {
        let batch = vec![
            message(2, "9", "2025-01-01T00:00:00Z"),
            message(1, "10", "2025-01-01T00:00:00Z"),
            message(1, "9", "2025-01-01T00:00:00Z"),
        ];
        let records = activity_from(&batch);
        let keys: Vec<(String, RoomId)> = records
            .iter()
            .map(|r| (r.user_id.clone(), r.room_id))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_empty_batch_no_records() {
        assert!(activity_from(&[]).is_empty());
    }
}
