//! Postgres-backed Event Store.
//!
//! Optimistic concurrency is enforced by a unique constraint on
//! `(aggregate_id, sequence_number)`: two concurrent writers racing on the
//! same expected sequence both attempt the insert and exactly one commits.
//! The version check that precedes the insert is a fast-path rejection, not
//! the source of truth for concurrency safety.
//!
//! ## Error mapping
//!
//! | SQLx error | Postgres code | EventStoreError |
//! |---|---|---|
//! | unique violation | `23505` | `Concurrency` |
//! | check violation | `23514` | `Invalid` |
//! | pool closed / connection failure | n/a | `StorageTransient` |
//! | anything else | n/a | `StorageFatal` |

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{instrument, warn, Span};

use coordinator_core::{AggregateId, ExpectedVersion};

use crate::error::EventStoreError;
use crate::model::{NewEvent, OutboxEntry, OutboxStatus, Snapshot, StoredEvent};
use crate::query::{EventFilter, MAX_READ_ALL_LIMIT};
use crate::r#trait::{EventStore, OutboxStore};

#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn check_stream_version(
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: &AggregateId,
    ) -> Result<u64, EventStoreError> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(sequence_number), 0) AS current_version FROM events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("check_stream_version", e))?;

        let current: i64 = row
            .try_get("current_version")
            .map_err(|e| EventStoreError::StorageFatal(e.to_string()))?;
        Ok(current as u64)
    }

    async fn insert_event(
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: &AggregateId,
        aggregate_type: &str,
        sequence_number: u64,
        event: NewEvent,
    ) -> Result<StoredEvent, EventStoreError> {
        let metadata_json = serde_json::to_value(&event.metadata)
            .map_err(|e| EventStoreError::Invalid(e.to_string()))?;

        let row = sqlx::query(
            r#"
            INSERT INTO events (
                aggregate_id, aggregate_type, sequence_number,
                event_type, payload, metadata, timestamp, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), 1)
            RETURNING global_id, timestamp
            "#,
        )
        .bind(aggregate_id.as_str())
        .bind(aggregate_type)
        .bind(sequence_number as i64)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(&metadata_json)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                EventStoreError::Concurrency(format!(
                    "concurrent append detected at sequence {sequence_number}"
                ))
            } else {
                map_sqlx_error("insert_event", e)
            }
        })?;

        let global_id: i64 = row
            .try_get("global_id")
            .map_err(|e| EventStoreError::StorageFatal(e.to_string()))?;
        let timestamp = row
            .try_get("timestamp")
            .map_err(|e| EventStoreError::StorageFatal(e.to_string()))?;

        sqlx::query(
            "INSERT INTO outbox (global_id, topic, partition_key, status, attempts) \
             VALUES ($1, $2, $3, 'PENDING', 0)",
        )
        .bind(global_id)
        .bind(&event.event_type)
        .bind(aggregate_id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_outbox", e))?;

        Ok(StoredEvent {
            global_id,
            aggregate_id: aggregate_id.clone(),
            aggregate_type: aggregate_type.to_string(),
            sequence_number,
            event_type: event.event_type,
            payload: event.payload,
            metadata: event.metadata,
            timestamp,
            version: global_id,
        })
    }

    async fn append_inner(
        &self,
        aggregate_id: &AggregateId,
        aggregate_type: &str,
        expected_sequence: ExpectedVersion,
        events: Vec<NewEvent>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let current = Self::check_stream_version(&mut tx, aggregate_id).await?;
        if !expected_sequence.matches(current + 1) {
            tx.rollback().await.ok();
            return Err(EventStoreError::Concurrency(format!(
                "expected sequence {expected_sequence:?}, next slot is {}",
                current + 1
            )));
        }

        let mut stored = Vec::with_capacity(events.len());
        for (i, event) in events.into_iter().enumerate() {
            match Self::insert_event(&mut tx, aggregate_id, aggregate_type, current + 1 + i as u64, event)
                .await
            {
                Ok(e) => stored.push(e),
                Err(err) => {
                    tx.rollback().await.ok();
                    return Err(err);
                }
            }
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(stored)
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[instrument(skip(self, event), fields(aggregate_id = %aggregate_id, aggregate_type))]
    async fn append(
        &self,
        aggregate_id: &AggregateId,
        aggregate_type: &str,
        expected_sequence: ExpectedVersion,
        event: NewEvent,
    ) -> Result<StoredEvent, EventStoreError> {
        let mut stored = self
            .append_inner(aggregate_id, aggregate_type, expected_sequence, vec![event])
            .await?;
        Ok(stored.remove(0))
    }

    #[instrument(skip(self, events), fields(aggregate_id = %aggregate_id, count = events.len()))]
    async fn append_batch(
        &self,
        aggregate_id: &AggregateId,
        aggregate_type: &str,
        expected_sequence: ExpectedVersion,
        events: Vec<NewEvent>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.append_inner(aggregate_id, aggregate_type, expected_sequence, events)
            .await
    }

    #[instrument(skip(self), fields(aggregate_id = %aggregate_id))]
    async fn read(
        &self,
        aggregate_id: &AggregateId,
        from_sequence: u64,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let span = Span::current();
        let rows = sqlx::query(
            r#"
            SELECT global_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, payload, metadata, timestamp, version
            FROM events
            WHERE aggregate_id = $1 AND sequence_number >= $2
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(aggregate_id.as_str())
        .bind(from_sequence as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("read", e))?;

        let events = rows
            .iter()
            .map(EventRow::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EventStoreError::StorageFatal(e.to_string()))?
            .into_iter()
            .map(EventRow::into_stored)
            .collect::<Result<Vec<_>, _>>()?;

        span.record("event_count", events.len());
        Ok(events)
    }

    async fn read_all(
        &self,
        from_global_id: i64,
        filter: EventFilter,
        limit: Option<usize>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let limit = limit.unwrap_or(MAX_READ_ALL_LIMIT).min(MAX_READ_ALL_LIMIT) as i64;

        let rows = sqlx::query(
            r#"
            SELECT global_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, payload, metadata, timestamp, version
            FROM events
            WHERE global_id >= $1
                AND ($2::text IS NULL OR aggregate_type = $2)
                AND ($3::text IS NULL OR event_type = $3)
                AND ($4::timestamptz IS NULL OR timestamp >= $4)
                AND ($5::timestamptz IS NULL OR timestamp <= $5)
            ORDER BY global_id ASC
            LIMIT $6
            "#,
        )
        .bind(from_global_id)
        .bind(filter.aggregate_type.as_deref())
        .bind(filter.event_type.as_deref())
        .bind(filter.occurred_after)
        .bind(filter.occurred_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("read_all", e))?;

        rows.iter()
            .map(EventRow::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EventStoreError::StorageFatal(e.to_string()))?
            .into_iter()
            .map(EventRow::into_stored)
            .collect()
    }

    async fn save_snapshot(
        &self,
        aggregate_id: &AggregateId,
        aggregate_type: &str,
        sequence_number: u64,
        payload: serde_json::Value,
    ) -> Result<(), EventStoreError> {
        let current = sqlx::query(
            "SELECT COALESCE(MAX(sequence_number), 0) AS max_seq FROM events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_snapshot_check", e))?;

        let max_seq: i64 = current
            .try_get("max_seq")
            .map_err(|e| EventStoreError::StorageFatal(e.to_string()))?;
        if sequence_number as i64 > max_seq {
            return Err(EventStoreError::Invalid(format!(
                "snapshot sequence {sequence_number} exceeds stream max {max_seq}"
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO snapshots (aggregate_id, aggregate_type, sequence_number, payload, timestamp)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (aggregate_id) DO UPDATE SET
                aggregate_type = EXCLUDED.aggregate_type,
                sequence_number = EXCLUDED.sequence_number,
                payload = EXCLUDED.payload,
                timestamp = NOW()
            "#,
        )
        .bind(aggregate_id.as_str())
        .bind(aggregate_type)
        .bind(sequence_number as i64)
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_snapshot", e))?;

        Ok(())
    }

    async fn latest_snapshot(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Option<Snapshot>, EventStoreError> {
        let row = sqlx::query(
            "SELECT aggregate_id, aggregate_type, sequence_number, payload, timestamp \
             FROM snapshots WHERE aggregate_id = $1",
        )
        .bind(aggregate_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("latest_snapshot", e))?;

        row.map(|r| SnapshotRow::from_row(&r).map(SnapshotRow::into_snapshot))
            .transpose()
            .map_err(|e: sqlx::Error| EventStoreError::StorageFatal(e.to_string()))
    }
}

#[async_trait]
impl OutboxStore for PostgresEventStore {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, EventStoreError> {
        let rows = sqlx::query(
            "SELECT global_id, topic, partition_key, status, attempts, last_error \
             FROM outbox WHERE status = 'PENDING' ORDER BY global_id ASC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_pending", e))?;

        rows.iter()
            .map(OutboxRow::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EventStoreError::StorageFatal(e.to_string()))
            .map(|rows| rows.into_iter().map(OutboxRow::into_entry).collect())
    }

    async fn mark_published(&self, global_id: i64) -> Result<(), EventStoreError> {
        sqlx::query("UPDATE outbox SET status = 'PUBLISHED' WHERE global_id = $1")
            .bind(global_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("mark_published", e))?;
        Ok(())
    }

    async fn mark_attempt_failed(
        &self,
        global_id: i64,
        error: &str,
    ) -> Result<OutboxEntry, EventStoreError> {
        let row = sqlx::query(
            r#"
            UPDATE outbox SET attempts = attempts + 1, last_error = $2
            WHERE global_id = $1
            RETURNING global_id, topic, partition_key, status, attempts, last_error
            "#,
        )
        .bind(global_id)
        .bind(error)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_attempt_failed", e))?;

        OutboxRow::from_row(&row)
            .map(OutboxRow::into_entry)
            .map_err(|e| EventStoreError::StorageFatal(e.to_string()))
    }

    async fn dead_letter(&self, global_id: i64) -> Result<(), EventStoreError> {
        warn!(global_id, "outbox entry exhausted retries, moving to dead-letter");
        sqlx::query("UPDATE outbox SET status = 'FAILED' WHERE global_id = $1")
            .bind(global_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("dead_letter", e))?;
        Ok(())
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                Some("23514") | Some("23503") => EventStoreError::Invalid(msg),
                _ => EventStoreError::StorageFatal(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            EventStoreError::StorageTransient(format!("{operation}: {err}"))
        }
        _ => EventStoreError::StorageFatal(format!("{operation}: {err}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

#[derive(Debug)]
struct EventRow {
    global_id: i64,
    aggregate_id: String,
    aggregate_type: String,
    sequence_number: i64,
    event_type: String,
    payload: serde_json::Value,
    metadata: serde_json::Value,
    timestamp: chrono::DateTime<chrono::Utc>,
    version: i64,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for EventRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            global_id: row.try_get("global_id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_type: row.try_get("aggregate_type")?,
            sequence_number: row.try_get("sequence_number")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            metadata: row.try_get("metadata")?,
            timestamp: row.try_get("timestamp")?,
            version: row.try_get("version")?,
        })
    }
}

impl EventRow {
    fn into_stored(self) -> Result<StoredEvent, EventStoreError> {
        let aggregate_id = AggregateId::new(self.aggregate_id)
            .map_err(|e| EventStoreError::StorageFatal(e.to_string()))?;
        let metadata = serde_json::from_value(self.metadata)
            .map_err(|e| EventStoreError::StorageFatal(e.to_string()))?;
        Ok(StoredEvent {
            global_id: self.global_id,
            aggregate_id,
            aggregate_type: self.aggregate_type,
            sequence_number: self.sequence_number as u64,
            event_type: self.event_type,
            payload: self.payload,
            metadata,
            timestamp: self.timestamp,
            version: self.version,
        })
    }
}

#[derive(Debug)]
struct SnapshotRow {
    aggregate_id: String,
    aggregate_type: String,
    sequence_number: i64,
    payload: serde_json::Value,
    timestamp: chrono::DateTime<chrono::Utc>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for SnapshotRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_type: row.try_get("aggregate_type")?,
            sequence_number: row.try_get("sequence_number")?,
            payload: row.try_get("payload")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

impl SnapshotRow {
    fn into_snapshot(self) -> Snapshot {
        Snapshot {
            aggregate_id: AggregateId::new(self.aggregate_id).unwrap_or_else(|_| {
                AggregateId::new("invalid").expect("literal is non-empty")
            }),
            aggregate_type: self.aggregate_type,
            sequence_number: self.sequence_number as u64,
            payload: self.payload,
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug)]
struct OutboxRow {
    global_id: i64,
    topic: String,
    partition_key: String,
    status: String,
    attempts: i32,
    last_error: Option<String>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for OutboxRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            global_id: row.try_get("global_id")?,
            topic: row.try_get("topic")?,
            partition_key: row.try_get("partition_key")?,
            status: row.try_get("status")?,
            attempts: row.try_get("attempts")?,
            last_error: row.try_get("last_error")?,
        })
    }
}

impl OutboxRow {
    fn into_entry(self) -> OutboxEntry {
        let status = match self.status.as_str() {
            "PUBLISHED" => OutboxStatus::Published,
            "FAILED" => OutboxStatus::Failed,
            _ => OutboxStatus::Pending,
        };
        OutboxEntry {
            global_id: self.global_id,
            topic: self.topic,
            partition_key: self.partition_key,
            status,
            attempts: self.attempts as u32,
            last_error: self.last_error,
        }
    }
}
