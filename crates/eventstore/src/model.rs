//! Event Store entities: events, snapshots, and outbox entries.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use coordinator_core::AggregateId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// An event not yet assigned a sequence number or globalId.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_type: String,
    pub payload: JsonValue,
    pub metadata: HashMap<String, String>,
}

/// A committed, immutable event. `global_id` orders commits across all
/// aggregates; `sequence_number` orders them within one aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub global_id: i64,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub sequence_number: u64,
    pub event_type: String,
    pub payload: JsonValue,
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
    /// Detects accidental non-idempotent updates. Events are immutable; any
    /// observed mismatch against the value at insert time is a bug.
    pub version: i64,
}

/// Compressed aggregate state at a given sequence number, used to bound
/// replay cost. At most one per aggregate; a save replaces the prior one
/// atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub sequence_number: u64,
    pub payload: JsonValue,
    pub timestamp: DateTime<Utc>,
}

/// Delivery status of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Published,
    Failed,
}

/// One staging row per committed event, created in the same transaction as
/// the event insert. Until `status` becomes `Published` the row is
/// retriable by the Publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub global_id: i64,
    pub topic: String,
    pub partition_key: String,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}
