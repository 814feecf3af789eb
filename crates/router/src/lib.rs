//! Router (C3): picks a single healthy instance for a routing request.

mod hash;

pub use hash::fnv1a_hash;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use coordinator_core::AggregateId;
use coordinator_registry::{HandlerKind, Registry, RegistryError};
use tracing::instrument;

/// Errors the Router returns; both are retriable by the caller per the
/// error taxonomy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RouterError {
    #[error("no healthy handler for {kind:?} {type_name}")]
    NoHandler { kind: HandlerKind, type_name: String },

    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),
}

impl From<RegistryError> for RouterError {
    fn from(err: RegistryError) -> Self {
        // Read errors surface as REGISTRY_UNAVAILABLE; the Router never
        // falls back to a cache older than W (see coordinator_registry).
        Self::RegistryUnavailable(err.to_string())
    }
}

/// Selects a target instance given a (kind, typeName, aggregateId?) tuple.
///
/// Holds one round-robin counter per (kind, typeName) for requests without
/// an aggregateId (pure queries / broadcast-eligible queries). The counter
/// is in-process only: it is not a correctness requirement that round robin
/// be globally consistent across servers, only that hashed (aggregate-
/// affine) routing is.
pub struct Router<R: Registry + ?Sized> {
    registry: Arc<R>,
    round_robin: Mutex<HashMap<(HandlerKind, String), Arc<AtomicU64>>>,
}

impl<R: Registry + ?Sized> Router<R> {
    pub fn new(registry: Arc<R>) -> Self {
        Self {
            registry,
            round_robin: Mutex::new(HashMap::new()),
        }
    }

    #[instrument(skip(self), fields(kind = ?kind, type_name = %type_name))]
    pub async fn route(
        &self,
        kind: HandlerKind,
        type_name: &str,
        aggregate_id: Option<&AggregateId>,
    ) -> Result<coordinator_core::InstanceId, RouterError> {
        let instances = self
            .registry
            .list_instances_for_type(kind, type_name, true)
            .await?;

        if instances.is_empty() {
            return Err(RouterError::NoHandler {
                kind,
                type_name: type_name.to_string(),
            });
        }

        let index = match aggregate_id {
            Some(id) => {
                let hash = fnv1a_hash(id.as_str());
                (hash as usize) % instances.len()
            }
            None => {
                let counter = self.counter_for(kind, type_name);
                (counter.fetch_add(1, Ordering::Relaxed) as usize) % instances.len()
            }
        };

        Ok(instances[index].clone())
    }

    fn counter_for(&self, kind: HandlerKind, type_name: &str) -> Arc<AtomicU64> {
        let mut counters = self.round_robin.lock().expect("round robin mutex poisoned");
        counters
            .entry((kind, type_name.to_string()))
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordinator_registry::{Endpoint, HandlerSets, InMemoryRegistry};
    use std::collections::BTreeMap;

    async fn registry_with_two_instances() -> Arc<InMemoryRegistry> {
        let registry = Arc::new(InMemoryRegistry::new());
        for name in ["i1", "i2"] {
            registry
                .register(
                    coordinator_core::InstanceId::new(name).unwrap(),
                    "svc".into(),
                    Endpoint { host: "h".into(), port: 1 },
                    HandlerSets {
                        command_types: vec!["CreateUser".into()],
                        ..Default::default()
                    },
                    BTreeMap::new(),
                    None,
                    chrono::Utc::now(),
                )
                .await
                .unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn routes_same_aggregate_to_same_instance() {
        let registry = registry_with_two_instances().await;
        let router = Router::new(registry);
        let aggregate_id = AggregateId::new("user-42").unwrap();

        let first = router
            .route(HandlerKind::Command, "CreateUser", Some(&aggregate_id))
            .await
            .unwrap();
        let second = router
            .route(HandlerKind::Command, "CreateUser", Some(&aggregate_id))
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn round_robins_without_aggregate_id() {
        let registry = registry_with_two_instances().await;
        let router = Router::new(registry);

        let first = router
            .route(HandlerKind::Command, "CreateUser", None)
            .await
            .unwrap();
        let second = router
            .route(HandlerKind::Command, "CreateUser", None)
            .await
            .unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn no_handler_when_type_unregistered() {
        let registry = Arc::new(InMemoryRegistry::new());
        let router = Router::new(registry);

        let result = router.route(HandlerKind::Command, "Nothing", None).await;
        assert!(matches!(result, Err(RouterError::NoHandler { .. })));
    }
}
