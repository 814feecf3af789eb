//! HTTP request/response bodies. One struct per RPC operation rather than
//! a generic envelope, so each wire shape can evolve independently.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use coordinator_registry::HealthState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterHandlersRequest {
    pub instance_id: String,
    pub service_name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub command_types: Vec<String>,
    #[serde(default)]
    pub query_types: Vec<String>,
    #[serde(default)]
    pub event_types: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub schema_map: Option<std::collections::HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationSummaryResponse {
    pub success: bool,
    pub message: String,
    pub commands_registered: usize,
    pub queries_registered: usize,
    pub events_registered: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterHandlersRequest {
    pub instance_id: String,
    #[serde(default)]
    pub command_types: Vec<String>,
    #[serde(default)]
    pub query_types: Vec<String>,
    #[serde(default)]
    pub event_types: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregistrationSummaryResponse {
    pub commands_removed: usize,
    pub queries_removed: usize,
    pub events_removed: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendHeartbeatRequest {
    pub instance_id: String,
    pub service_name: String,
    pub state: HealthState,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub client_timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverHandlersQuery {
    pub kind: String,
    pub type_name: String,
    #[serde(default)]
    pub only_healthy: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredInstance {
    pub instance_id: String,
    pub host: String,
    pub port: u16,
    pub state: HealthState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverHandlersResponse {
    pub instances: Vec<DiscoveredInstance>,
    pub total_count: usize,
    pub healthy_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCommandRequest {
    pub command_id: String,
    pub aggregate_id: String,
    pub command_type: String,
    pub payload: JsonValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCommandResponse {
    pub success: bool,
    pub result: Option<JsonValue>,
    pub error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQueryRequest {
    pub query_id: String,
    pub query_type: String,
    pub payload: JsonValue,
    #[serde(default)]
    pub expected_response_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitEventRequest {
    pub event_type: String,
    pub aggregate_id: String,
    pub aggregate_type: String,
    /// `null` means "any version"; an integer pins an exact expected
    /// sequence number for optimistic concurrency.
    pub expected_sequence: Option<u64>,
    pub payload: JsonValue,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitEventResponse {
    pub global_id: i64,
    pub sequence_number: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadEventsQuery {
    #[serde(default)]
    pub from_sequence: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadAllQuery {
    #[serde(default)]
    pub from_global_id: i64,
    pub aggregate_type: Option<String>,
    pub event_type: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub global_id: i64,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub sequence_number: u64,
    pub event_type: String,
    pub payload: JsonValue,
    pub metadata: std::collections::HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl From<coordinator_eventstore::StoredEvent> for EventRecord {
    fn from(e: coordinator_eventstore::StoredEvent) -> Self {
        Self {
            global_id: e.global_id,
            aggregate_id: e.aggregate_id.into_inner(),
            aggregate_type: e.aggregate_type,
            sequence_number: e.sequence_number,
            event_type: e.event_type,
            payload: e.payload,
            metadata: e.metadata,
            timestamp: e.timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSnapshotRequest {
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub sequence_number: u64,
    pub payload: JsonValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub sequence_number: u64,
    pub payload: JsonValue,
    pub timestamp: DateTime<Utc>,
}

impl From<coordinator_eventstore::Snapshot> for SnapshotResponse {
    fn from(s: coordinator_eventstore::Snapshot) -> Self {
        Self {
            aggregate_id: s.aggregate_id.into_inner(),
            aggregate_type: s.aggregate_type,
            sequence_number: s.sequence_number,
            payload: s.payload,
            timestamp: s.timestamp,
        }
    }
}
