//! The Registry (C1): {instance -> handler sets} and {type -> instance set}
//! with bounded staleness, backed by an in-process TTL-aware store.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coordinator_core::InstanceId;
use tokio::sync::RwLock;

use crate::model::{
    Endpoint, HandlerKind, HandlerSets, HealthState, Instance, RegistrationSummary,
    UnregisterSelector,
};

/// Errors surfaced by a Registry backing store. Any write error is returned
/// to the caller so the instance can retry; read errors are handled by
/// callers treating the type as having no instances (see the router crate).
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid registration: {0}")]
    Invalid(String),
    #[error("registry store unavailable: {0}")]
    Unavailable(String),
}

/// Abstraction over the shared, TTL-capable store backing the registry.
///
/// The contract (bounded staleness window W, idempotent register/unregister,
/// lexicographic instance ordering) is the same regardless of backing; an
/// in-memory implementation is provided for tests and single-process
/// deployments, with the trait left open for a shared KV-store-backed
/// implementation in multi-server deployments.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn register(
        &self,
        instance_id: InstanceId,
        service_name: String,
        endpoint: Endpoint,
        handlers: HandlerSets,
        metadata: BTreeMap<String, String>,
        schema_map: Option<HashMap<String, String>>,
        now: DateTime<Utc>,
    ) -> Result<RegistrationSummary, RegistryError>;

    async fn unregister(
        &self,
        instance_id: &InstanceId,
        subset: Option<UnregisterSelector>,
    ) -> Result<(), RegistryError>;

    async fn list_instances_for_type(
        &self,
        kind: HandlerKind,
        type_name: &str,
        only_healthy: bool,
    ) -> Result<Vec<InstanceId>, RegistryError>;

    async fn list_types_for_instance(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Option<HandlerSets>, RegistryError>;

    async fn get_instance(&self, instance_id: &InstanceId) -> Result<Option<Instance>, RegistryError>;

    async fn list_instances(&self) -> Result<Vec<Instance>, RegistryError>;

    async fn record_heartbeat(
        &self,
        instance_id: &InstanceId,
        state: HealthState,
        metadata: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError>;

    /// Transitions any stale Healthy/Degraded instance to Expired. Returns
    /// the instance ids that transitioned during this call.
    async fn scan_expire(
        &self,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<Vec<InstanceId>, RegistryError>;

    /// Marks an instance DEGRADED (used when its heartbeat stream drops
    /// without reconnecting by the next scan).
    async fn mark_degraded(&self, instance_id: &InstanceId) -> Result<(), RegistryError>;
}

#[derive(Debug, Default)]
struct State {
    instances: HashMap<InstanceId, Instance>,
    bindings: HashMap<InstanceId, HandlerSets>,
    index: HashMap<(HandlerKind, String), BTreeSet<InstanceId>>,
}

impl State {
    fn remove_from_index(&mut self, instance_id: &InstanceId, kind: HandlerKind, type_name: &str) {
        if let Some(set) = self.index.get_mut(&(kind, type_name.to_string())) {
            set.remove(instance_id);
            if set.is_empty() {
                self.index.remove(&(kind, type_name.to_string()));
            }
        }
    }

    fn add_to_index(&mut self, instance_id: &InstanceId, kind: HandlerKind, type_name: &str) {
        self.index
            .entry((kind, type_name.to_string()))
            .or_default()
            .insert(instance_id.clone());
    }

    fn clear_bindings_for(&mut self, instance_id: &InstanceId) {
        if let Some(prior) = self.bindings.remove(instance_id) {
            for t in &prior.command_types {
                self.remove_from_index(instance_id, HandlerKind::Command, t);
            }
            for t in &prior.query_types {
                self.remove_from_index(instance_id, HandlerKind::Query, t);
            }
            for t in &prior.event_types {
                self.remove_from_index(instance_id, HandlerKind::Event, t);
            }
        }
    }
}

fn check_duplicates(types: &[String], label: &str) -> Result<(), RegistryError> {
    let mut seen = HashSet::new();
    for t in types {
        if !seen.insert(t) {
            return Err(RegistryError::Invalid(format!(
                "duplicate {label} type name: {t}"
            )));
        }
    }
    Ok(())
}

/// In-memory Registry implementation. Suitable as the sole backing store for
/// a single-process deployment, and as the reference implementation the
/// property tests exercise.
#[derive(Default)]
pub struct InMemoryRegistry {
    state: RwLock<State>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn register(
        &self,
        instance_id: InstanceId,
        service_name: String,
        endpoint: Endpoint,
        handlers: HandlerSets,
        metadata: BTreeMap<String, String>,
        schema_map: Option<HashMap<String, String>>,
        now: DateTime<Utc>,
    ) -> Result<RegistrationSummary, RegistryError> {
        check_duplicates(&handlers.command_types, "command")?;
        check_duplicates(&handlers.query_types, "query")?;
        check_duplicates(&handlers.event_types, "event")?;

        let mut state = self.state.write().await;

        let prior = state.bindings.get(&instance_id).cloned().unwrap_or_default();
        let commands_removed = prior
            .command_types
            .iter()
            .filter(|t| !handlers.command_types.contains(t))
            .count();
        let queries_removed = prior
            .query_types
            .iter()
            .filter(|t| !handlers.query_types.contains(t))
            .count();
        let events_removed = prior
            .event_types
            .iter()
            .filter(|t| !handlers.event_types.contains(t))
            .count();

        state.clear_bindings_for(&instance_id);

        for t in &handlers.command_types {
            state.add_to_index(&instance_id, HandlerKind::Command, t);
        }
        for t in &handlers.query_types {
            state.add_to_index(&instance_id, HandlerKind::Query, t);
        }
        for t in &handlers.event_types {
            state.add_to_index(&instance_id, HandlerKind::Event, t);
        }

        let commands_registered = handlers.command_types.len();
        let queries_registered = handlers.query_types.len();
        let events_registered = handlers.event_types.len();
        state.bindings.insert(instance_id.clone(), handlers);

        let registered_at = state
            .instances
            .get(&instance_id)
            .map(|i| i.registered_at)
            .unwrap_or(now);

        state.instances.insert(
            instance_id.clone(),
            Instance {
                instance_id,
                service_name,
                endpoint,
                metadata,
                schema_map,
                state: HealthState::Healthy,
                last_heartbeat: now,
                registered_at,
            },
        );

        Ok(RegistrationSummary {
            commands_registered,
            queries_registered,
            events_registered,
            commands_removed,
            queries_removed,
            events_removed,
        })
    }

    async fn unregister(
        &self,
        instance_id: &InstanceId,
        subset: Option<UnregisterSelector>,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;

        match subset {
            None => {
                state.clear_bindings_for(instance_id);
                state.instances.remove(instance_id);
            }
            Some(selector) => {
                for t in &selector.command_types {
                    state.remove_from_index(instance_id, HandlerKind::Command, t);
                }
                for t in &selector.query_types {
                    state.remove_from_index(instance_id, HandlerKind::Query, t);
                }
                for t in &selector.event_types {
                    state.remove_from_index(instance_id, HandlerKind::Event, t);
                }
                if let Some(bindings) = state.bindings.get_mut(instance_id) {
                    bindings
                        .command_types
                        .retain(|t| !selector.command_types.contains(t));
                    bindings
                        .query_types
                        .retain(|t| !selector.query_types.contains(t));
                    bindings
                        .event_types
                        .retain(|t| !selector.event_types.contains(t));
                }
            }
        }
        Ok(())
    }

    async fn list_instances_for_type(
        &self,
        kind: HandlerKind,
        type_name: &str,
        only_healthy: bool,
    ) -> Result<Vec<InstanceId>, RegistryError> {
        let state = self.state.read().await;
        let Some(set) = state.index.get(&(kind, type_name.to_string())) else {
            return Ok(Vec::new());
        };
        let result = set
            .iter()
            .filter(|id| {
                if !only_healthy {
                    return true;
                }
                matches!(
                    state.instances.get(*id).map(|i| i.state),
                    Some(HealthState::Healthy) | Some(HealthState::Degraded)
                )
            })
            .cloned()
            .collect();
        Ok(result)
    }

    async fn list_types_for_instance(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Option<HandlerSets>, RegistryError> {
        let state = self.state.read().await;
        Ok(state.bindings.get(instance_id).cloned())
    }

    async fn get_instance(&self, instance_id: &InstanceId) -> Result<Option<Instance>, RegistryError> {
        let state = self.state.read().await;
        Ok(state.instances.get(instance_id).cloned())
    }

    async fn list_instances(&self) -> Result<Vec<Instance>, RegistryError> {
        let state = self.state.read().await;
        Ok(state.instances.values().cloned().collect())
    }

    async fn record_heartbeat(
        &self,
        instance_id: &InstanceId,
        state_update: HealthState,
        metadata: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        match state.instances.get_mut(instance_id) {
            Some(instance) => {
                instance.last_heartbeat = now;
                instance.state = state_update;
                instance.metadata.extend(metadata);
                Ok(())
            }
            None => Err(RegistryError::Invalid(format!(
                "heartbeat for unknown instance {instance_id}"
            ))),
        }
    }

    async fn scan_expire(
        &self,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<Vec<InstanceId>, RegistryError> {
        let mut state = self.state.write().await;
        let expired: Vec<InstanceId> = state
            .instances
            .values()
            .filter(|i| {
                matches!(i.state, HealthState::Healthy | HealthState::Degraded)
                    && i.is_expired(now, ttl)
            })
            .map(|i| i.instance_id.clone())
            .collect();

        for id in &expired {
            if let Some(instance) = state.instances.get_mut(id) {
                instance.state = HealthState::Expired;
            }
        }
        Ok(expired)
    }

    async fn mark_degraded(&self, instance_id: &InstanceId) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        if let Some(instance) = state.instances.get_mut(instance_id) {
            if instance.state == HealthState::Healthy {
                instance.state = HealthState::Degraded;
            }
        }
        Ok(())
    }
}

pub fn shared() -> Arc<InMemoryRegistry> {
    Arc::new(InMemoryRegistry::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iid(s: &str) -> InstanceId {
        InstanceId::new(s).unwrap()
    }

    fn endpoint() -> Endpoint {
        Endpoint {
            host: "127.0.0.1".into(),
            port: 9000,
        }
    }

    #[tokio::test]
    async fn register_then_list_returns_ordered() {
        let reg = InMemoryRegistry::new();
        let now = Utc::now();
        reg.register(
            iid("svc-b"),
            "svc".into(),
            endpoint(),
            HandlerSets {
                command_types: vec!["CreateUser".into()],
                ..Default::default()
            },
            BTreeMap::new(),
            None,
            now,
        )
        .await
        .unwrap();
        reg.register(
            iid("svc-a"),
            "svc".into(),
            endpoint(),
            HandlerSets {
                command_types: vec!["CreateUser".into()],
                ..Default::default()
            },
            BTreeMap::new(),
            None,
            now,
        )
        .await
        .unwrap();

        let ids = reg
            .list_instances_for_type(HandlerKind::Command, "CreateUser", true)
            .await
            .unwrap();
        assert_eq!(ids, vec![iid("svc-a"), iid("svc-b")]);
    }

    #[tokio::test]
    async fn reregistration_replaces_bindings_idempotently() {
        let reg = InMemoryRegistry::new();
        let now = Utc::now();
        let handlers = HandlerSets {
            command_types: vec!["CreateUser".into()],
            ..Default::default()
        };
        let summary1 = reg
            .register(
                iid("svc-a"),
                "svc".into(),
                endpoint(),
                handlers.clone(),
                BTreeMap::new(),
                None,
                now,
            )
            .await
            .unwrap();
        assert_eq!(summary1.commands_registered, 1);

        let summary2 = reg
            .register(
                iid("svc-a"),
                "svc".into(),
                endpoint(),
                handlers,
                BTreeMap::new(),
                None,
                now,
            )
            .await
            .unwrap();
        assert_eq!(summary2.commands_registered, 1);
        assert_eq!(summary2.commands_removed, 0);

        let ids = reg
            .list_instances_for_type(HandlerKind::Command, "CreateUser", true)
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_type_names_are_rejected() {
        let reg = InMemoryRegistry::new();
        let result = reg
            .register(
                iid("svc-a"),
                "svc".into(),
                endpoint(),
                HandlerSets {
                    command_types: vec!["CreateUser".into(), "CreateUser".into()],
                    ..Default::default()
                },
                BTreeMap::new(),
                None,
                Utc::now(),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unregister_nonexistent_instance_is_a_noop() {
        let reg = InMemoryRegistry::new();
        let result = reg.unregister(&iid("ghost"), None).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn expired_instances_excluded_from_only_healthy() {
        let reg = InMemoryRegistry::new();
        let now = Utc::now();
        reg.register(
            iid("svc-a"),
            "svc".into(),
            endpoint(),
            HandlerSets {
                command_types: vec!["CreateUser".into()],
                ..Default::default()
            },
            BTreeMap::new(),
            None,
            now - chrono::Duration::seconds(200),
        )
        .await
        .unwrap();

        let expired = reg
            .scan_expire(now, chrono::Duration::seconds(90))
            .await
            .unwrap();
        assert_eq!(expired, vec![iid("svc-a")]);

        let ids = reg
            .list_instances_for_type(HandlerKind::Command, "CreateUser", true)
            .await
            .unwrap();
        assert!(ids.is_empty());

        let ids_all = reg
            .list_instances_for_type(HandlerKind::Command, "CreateUser", false)
            .await
            .unwrap();
        assert_eq!(ids_all, vec![iid("svc-a")]);
    }
}
