//! Event Store (C4): append-only log with per-aggregate ordering,
//! optimistic concurrency, snapshots, and an outbox handoff to the
//! Publisher.

use async_trait::async_trait;
use coordinator_core::{AggregateId, ExpectedVersion};

use crate::error::EventStoreError;
use crate::model::{NewEvent, OutboxEntry, Snapshot, StoredEvent};
use crate::query::EventFilter;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends one event, assigning it `sequenceNumber =
    /// expected_sequence`'s target and a monotonic globalId. Writes the
    /// event and its OutboxEntry in one transaction.
    async fn append(
        &self,
        aggregate_id: &AggregateId,
        aggregate_type: &str,
        expected_sequence: ExpectedVersion,
        event: NewEvent,
    ) -> Result<StoredEvent, EventStoreError>;

    /// Atomic over the whole batch: either every event (and its
    /// OutboxEntry) commits, or none do. Assigned sequence numbers are
    /// contiguous starting at whatever `expected_sequence` resolves to.
    async fn append_batch(
        &self,
        aggregate_id: &AggregateId,
        aggregate_type: &str,
        expected_sequence: ExpectedVersion,
        events: Vec<NewEvent>,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Events for `aggregate_id` with `sequenceNumber >= from_sequence`, in
    /// ascending sequence order.
    async fn read(
        &self,
        aggregate_id: &AggregateId,
        from_sequence: u64,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Events in globalId order, optionally filtered, capped at `limit`
    /// (defaulting to and never exceeding [`crate::query::MAX_READ_ALL_LIMIT`]).
    async fn read_all(
        &self,
        from_global_id: i64,
        filter: EventFilter,
        limit: Option<usize>,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Replaces any prior snapshot for `aggregate_id`. `sequence_number`
    /// must be <= the aggregate's current max sequence.
    async fn save_snapshot(
        &self,
        aggregate_id: &AggregateId,
        aggregate_type: &str,
        sequence_number: u64,
        payload: serde_json::Value,
    ) -> Result<(), EventStoreError>;

    async fn latest_snapshot(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Option<Snapshot>, EventStoreError>;
}

/// The Publisher's view onto the outbox: drain PENDING entries in commit
/// order and report delivery outcomes. Implemented by the same storage
/// backing as [`EventStore`] so append and outbox writes share a
/// transaction, but kept as a separate trait since the Publisher never
/// needs to append events.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// PENDING entries in ascending globalId order, at most `limit` rows.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, EventStoreError>;

    async fn mark_published(&self, global_id: i64) -> Result<(), EventStoreError>;

    /// Increments `attempts` and records `error`. Returns the updated entry
    /// so the caller can decide whether the retry ceiling was hit.
    async fn mark_attempt_failed(
        &self,
        global_id: i64,
        error: &str,
    ) -> Result<OutboxEntry, EventStoreError>;

    /// Moves the entry to FAILED (dead-letter); operator intervention
    /// required from this point.
    async fn dead_letter(&self, global_id: i64) -> Result<(), EventStoreError>;
}
