//! In-memory Event Store. Reference implementation for tests and
//! single-process development; the Postgres implementation carries the
//! same contract for production deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use coordinator_core::{AggregateId, ExpectedVersion};
use tokio::sync::RwLock;

use crate::error::EventStoreError;
use crate::model::{NewEvent, OutboxEntry, OutboxStatus, Snapshot, StoredEvent};
use crate::query::{EventFilter, MAX_READ_ALL_LIMIT};
use crate::r#trait::{EventStore, OutboxStore};

#[derive(Default)]
struct State {
    streams: HashMap<AggregateId, Vec<StoredEvent>>,
    snapshots: HashMap<AggregateId, Snapshot>,
    outbox: Vec<OutboxEntry>,
    next_global_id: i64,
}

/// Thread-safe, process-local event store. All operations take the single
/// write lock for their duration; this is the in-memory analogue of the
/// unique-constraint serialization a real database performs per aggregate.
#[derive(Default)]
pub struct InMemoryEventStore {
    state: RwLock<State>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn append_locked(
        state: &mut State,
        aggregate_id: &AggregateId,
        aggregate_type: &str,
        sequence_number: u64,
        event: NewEvent,
    ) -> StoredEvent {
        state.next_global_id += 1;
        let global_id = state.next_global_id;
        let stored = StoredEvent {
            global_id,
            aggregate_id: aggregate_id.clone(),
            aggregate_type: aggregate_type.to_string(),
            sequence_number,
            event_type: event.event_type.clone(),
            payload: event.payload,
            metadata: event.metadata,
            timestamp: chrono::Utc::now(),
            version: global_id,
        };

        state.outbox.push(OutboxEntry {
            global_id,
            topic: event.event_type,
            partition_key: aggregate_id.as_str().to_string(),
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
        });

        state
            .streams
            .entry(aggregate_id.clone())
            .or_default()
            .push(stored.clone());

        stored
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        aggregate_id: &AggregateId,
        aggregate_type: &str,
        expected_sequence: ExpectedVersion,
        event: NewEvent,
    ) -> Result<StoredEvent, EventStoreError> {
        let mut state = self.state.write().await;
        let current = state.streams.get(aggregate_id).map_or(0, Vec::len) as u64;

        if !expected_sequence.matches(current + 1) {
            return Err(EventStoreError::Concurrency(format!(
                "expected sequence {expected_sequence:?}, next slot is {}",
                current + 1
            )));
        }

        Ok(Self::append_locked(
            &mut state,
            aggregate_id,
            aggregate_type,
            current + 1,
            event,
        ))
    }

    async fn append_batch(
        &self,
        aggregate_id: &AggregateId,
        aggregate_type: &str,
        expected_sequence: ExpectedVersion,
        events: Vec<NewEvent>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.state.write().await;
        let current = state.streams.get(aggregate_id).map_or(0, Vec::len) as u64;

        if !expected_sequence.matches(current + 1) {
            return Err(EventStoreError::Concurrency(format!(
                "expected sequence {expected_sequence:?}, next slot is {}",
                current + 1
            )));
        }

        let mut stored = Vec::with_capacity(events.len());
        for (i, event) in events.into_iter().enumerate() {
            stored.push(Self::append_locked(
                &mut state,
                aggregate_id,
                aggregate_type,
                current + 1 + i as u64,
                event,
            ));
        }
        Ok(stored)
    }

    async fn read(
        &self,
        aggregate_id: &AggregateId,
        from_sequence: u64,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let state = self.state.read().await;
        Ok(state
            .streams
            .get(aggregate_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.sequence_number >= from_sequence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn read_all(
        &self,
        from_global_id: i64,
        filter: EventFilter,
        limit: Option<usize>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let state = self.state.read().await;
        let limit = limit.unwrap_or(MAX_READ_ALL_LIMIT).min(MAX_READ_ALL_LIMIT);

        let mut all: Vec<&StoredEvent> = state
            .streams
            .values()
            .flatten()
            .filter(|e| {
                e.global_id >= from_global_id
                    && filter.matches(&e.aggregate_type, &e.event_type, e.timestamp)
            })
            .collect();
        all.sort_by_key(|e| e.global_id);
        all.truncate(limit);

        Ok(all.into_iter().cloned().collect())
    }

    async fn save_snapshot(
        &self,
        aggregate_id: &AggregateId,
        aggregate_type: &str,
        sequence_number: u64,
        payload: serde_json::Value,
    ) -> Result<(), EventStoreError> {
        let mut state = self.state.write().await;
        let current_max = state.streams.get(aggregate_id).map_or(0, Vec::len) as u64;
        if sequence_number > current_max {
            return Err(EventStoreError::Invalid(format!(
                "snapshot sequence {sequence_number} exceeds stream max {current_max}"
            )));
        }

        state.snapshots.insert(
            aggregate_id.clone(),
            Snapshot {
                aggregate_id: aggregate_id.clone(),
                aggregate_type: aggregate_type.to_string(),
                sequence_number,
                payload,
                timestamp: chrono::Utc::now(),
            },
        );
        Ok(())
    }

    async fn latest_snapshot(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Option<Snapshot>, EventStoreError> {
        let state = self.state.read().await;
        Ok(state.snapshots.get(aggregate_id).cloned())
    }
}

#[async_trait]
impl OutboxStore for InMemoryEventStore {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, EventStoreError> {
        let state = self.state.read().await;
        Ok(state
            .outbox
            .iter()
            .filter(|e| e.status == OutboxStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, global_id: i64) -> Result<(), EventStoreError> {
        let mut state = self.state.write().await;
        if let Some(entry) = state.outbox.iter_mut().find(|e| e.global_id == global_id) {
            entry.status = OutboxStatus::Published;
        }
        Ok(())
    }

    async fn mark_attempt_failed(
        &self,
        global_id: i64,
        error: &str,
    ) -> Result<OutboxEntry, EventStoreError> {
        let mut state = self.state.write().await;
        let entry = state
            .outbox
            .iter_mut()
            .find(|e| e.global_id == global_id)
            .ok_or_else(|| EventStoreError::Invalid(format!("unknown outbox entry {global_id}")))?;
        entry.attempts += 1;
        entry.last_error = Some(error.to_string());
        Ok(entry.clone())
    }

    async fn dead_letter(&self, global_id: i64) -> Result<(), EventStoreError> {
        let mut state = self.state.write().await;
        if let Some(entry) = state.outbox.iter_mut().find(|e| e.global_id == global_id) {
            entry.status = OutboxStatus::Failed;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn event(event_type: &str) -> NewEvent {
        NewEvent {
            event_type: event_type.to_string(),
            payload: serde_json::json!({}),
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn sequence_numbers_are_contiguous_from_one() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new("A").unwrap();

        let e1 = store
            .append(&aggregate_id, "Widget", ExpectedVersion::Exact(1), event("Created"))
            .await
            .unwrap();
        assert_eq!(e1.sequence_number, 1);

        let e2 = store
            .append(&aggregate_id, "Widget", ExpectedVersion::Exact(2), event("Updated"))
            .await
            .unwrap();
        assert_eq!(e2.sequence_number, 2);
    }

    #[tokio::test]
    async fn stale_expected_sequence_is_rejected_without_partial_state() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new("A").unwrap();

        store
            .append(&aggregate_id, "Widget", ExpectedVersion::Exact(1), event("Created"))
            .await
            .unwrap();

        let result = store
            .append(&aggregate_id, "Widget", ExpectedVersion::Exact(1), event("Created"))
            .await;
        assert!(matches!(result, Err(EventStoreError::Concurrency(_))));

        let events = store.read(&aggregate_id, 1).await.unwrap();
        assert_eq!(events.len(), 1, "failed append must not leave a partial row");

        let pending = OutboxStore::fetch_pending(&store, 10).await.unwrap();
        assert_eq!(pending.len(), 1, "failed append must not leave an outbox row");
    }

    #[tokio::test]
    async fn read_excludes_events_before_from_sequence() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new("A").unwrap();
        for i in 0..3 {
            store
                .append(
                    &aggregate_id,
                    "Widget",
                    ExpectedVersion::Exact(i + 1),
                    event("Updated"),
                )
                .await
                .unwrap();
        }

        let from_two = store.read(&aggregate_id, 2).await.unwrap();
        assert_eq!(from_two.len(), 2);
        assert!(from_two.iter().all(|e| e.sequence_number >= 2));
    }

    #[tokio::test]
    async fn snapshot_round_trips() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new("A").unwrap();
        store
            .append(&aggregate_id, "Widget", ExpectedVersion::Exact(1), event("Created"))
            .await
            .unwrap();

        store
            .save_snapshot(&aggregate_id, "Widget", 1, serde_json::json!({"n": 1}))
            .await
            .unwrap();

        let snapshot = store.latest_snapshot(&aggregate_id).await.unwrap().unwrap();
        assert_eq!(snapshot.sequence_number, 1);
    }

    #[tokio::test]
    async fn snapshot_ahead_of_stream_is_rejected() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new("A").unwrap();
        let result = store
            .save_snapshot(&aggregate_id, "Widget", 5, serde_json::json!({}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn outbox_entries_publish_in_commit_order() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new("A").unwrap();
        store
            .append(&aggregate_id, "Widget", ExpectedVersion::Exact(1), event("Created"))
            .await
            .unwrap();
        store
            .append(&aggregate_id, "Widget", ExpectedVersion::Exact(2), event("Updated"))
            .await
            .unwrap();

        let pending = OutboxStore::fetch_pending(&store, 10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].global_id < pending[1].global_id);
    }
}
