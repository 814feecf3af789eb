//! Registry entities: instances, handler bindings, and registration results.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use coordinator_core::InstanceId;
use serde::{Deserialize, Serialize};

/// Network address an instance can be reached at for forwarded requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// Liveness state of a registered instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    Healthy,
    Degraded,
    Stopping,
    Expired,
}

/// The three kinds of type a handler may be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandlerKind {
    Command,
    Query,
    Event,
}

/// A single (instance, kind, typeName) binding. `(instanceId, kind,
/// typeName)` is unique by construction: the registry stores these as set
/// members, never duplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerBinding {
    pub instance_id: InstanceId,
    pub kind: HandlerKind,
    pub type_name: String,
}

/// The three handler sets an instance declares at registration.
#[derive(Debug, Clone, Default)]
pub struct HandlerSets {
    pub command_types: Vec<String>,
    pub query_types: Vec<String>,
    pub event_types: Vec<String>,
}

/// Static and dynamic state tracked per instance.
#[derive(Debug, Clone)]
pub struct Instance {
    pub instance_id: InstanceId,
    pub service_name: String,
    pub endpoint: Endpoint,
    pub metadata: BTreeMap<String, String>,
    pub schema_map: Option<HashMap<String, String>>,
    pub state: HealthState,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}

impl Instance {
    /// True when `now - last_heartbeat` exceeds `ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_heartbeat) > ttl
    }
}

/// Result of a `register` call: counts of bindings added/removed by the
/// idempotent replace.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RegistrationSummary {
    pub commands_registered: usize,
    pub queries_registered: usize,
    pub events_registered: usize,
    pub commands_removed: usize,
    pub queries_removed: usize,
    pub events_removed: usize,
}

impl RegistrationSummary {
    pub fn success(&self) -> bool {
        true
    }
}

/// Selector for a partial `unregister`: remove only these bindings. `None`
/// for a field means "no bindings of that kind targeted"; passing `None` for
/// the whole selector removes the instance entirely.
#[derive(Debug, Clone, Default)]
pub struct UnregisterSelector {
    pub command_types: Vec<String>,
    pub query_types: Vec<String>,
    pub event_types: Vec<String>,
}
