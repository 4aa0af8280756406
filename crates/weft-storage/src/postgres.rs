//! Postgres-backed message store.
//!
//! The whole contract is two wire-coalesced statements per flush: a
//! multi-row `INSERT ... ON CONFLICT DO NOTHING RETURNING message_id` and
//! a multi-row activity upsert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashSet;
use uuid::Uuid;

use weft_core::QueueMessage;

use crate::error::{StorageError, StorageResult};
use crate::store::{MessageStore, UserActivityRecord};

/// A message store backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    /// Connect a pool to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] when the pool cannot be
    /// established.
    pub async fn connect(url: &str, max_connections: u32) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_id_i64(message: &QueueMessage) -> StorageResult<i64> {
    message
        .user_id
        .parse::<i64>()
        .map_err(|_| StorageError::Conversion(format!("non-numeric userId: {}", message.user_id)))
}

fn created_at(message: &QueueMessage) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&message.timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn insert_messages(
        &self,
        batch: &[QueueMessage],
    ) -> StorageResult<Vec<QueueMessage>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        // Pre-convert so a bad value fails before the statement is built.
        let mut rows = Vec::with_capacity(batch.len());
        for message in batch {
            rows.push((message, user_id_i64(message)?, created_at(message)));
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO messages \
             (message_id, room_id, user_id, username, text, kind, server_id, client_ip, created_at) ",
        );
        qb.push_values(rows, |mut b, (message, user_id, at)| {
            b.push_bind(message.message_id.as_uuid())
                .push_bind(i64::from(message.room_id.0))
                .push_bind(user_id)
                .push_bind(message.username.clone())
                .push_bind(message.message.clone())
                .push_bind(message.message_type.as_str())
                .push_bind(message.server_id.as_str().to_owned())
                .push_bind(message.client_ip.clone())
                .push_bind(at);
        });
        qb.push(" ON CONFLICT (message_id) DO NOTHING RETURNING message_id");

        let returned = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let inserted_ids: HashSet<Uuid> = returned
            .iter()
            .map(|row| row.get::<Uuid, _>("message_id"))
            .collect();

        Ok(batch
            .iter()
            .filter(|m| inserted_ids.contains(&m.message_id.as_uuid()))
            .cloned()
            .collect())
    }

    async fn upsert_activity(&self, records: &[UserActivityRecord]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let user_id = record.user_id.parse::<i64>().map_err(|_| {
                StorageError::Conversion(format!("non-numeric userId: {}", record.user_id))
            })?;
            rows.push((record, user_id));
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO user_activity \
             (user_id, room_id, first_activity, last_activity, message_count) ",
        );
        qb.push_values(rows, |mut b, (record, user_id)| {
            b.push_bind(user_id)
                .push_bind(i64::from(record.room_id.0))
                .push_bind(record.first_activity)
                .push_bind(record.last_activity)
                .push_bind(i64::try_from(record.message_count).unwrap_or(i64::MAX));
        });
        qb.push(
            " ON CONFLICT (user_id, room_id) DO UPDATE SET \
             last_activity = GREATEST(user_activity.last_activity, EXCLUDED.last_activity), \
             message_count = user_activity.message_count + EXCLUDED.message_count",
        );

        qb.build()
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }
}
