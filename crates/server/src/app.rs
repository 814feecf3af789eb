//! Assembles the coordination server from its components: an in-memory or
//! Postgres-backed Registry and Event Store, the Router sitting on top of
//! the Registry, and background workers for the Health Monitor and Event
//! Publisher.

use std::sync::Arc;

use axum::Router as AxumRouter;
use coordinator_config::CoordinatorConfig;
use coordinator_eventstore::{EventStore, InMemoryEventStore, OutboxStore};
use coordinator_publisher::{Broker, PublisherConfig, RedisStreamsBroker, WorkerHandle as PublisherHandle};
use coordinator_registry::{spawn_health_monitor, Registry, WorkerHandle as HealthHandle};
use coordinator_router::Router as CommandRouter;

use crate::routes::build_router;
use crate::state::AppState;

/// Background workers spun up alongside the HTTP surface. Holding these
/// keeps the tasks alive; `shutdown` stops them in turn.
pub struct Workers {
    pub health: HealthHandle,
    pub publisher: PublisherHandle,
}

impl Workers {
    pub async fn shutdown(self) {
        self.health.shutdown().await;
        self.publisher.shutdown().await;
    }
}

/// Builds an in-memory-backed server: no Postgres, no Redis, everything
/// held in process memory. Used by tests and single-process demos.
pub fn build_in_memory(config: Arc<CoordinatorConfig>) -> (AppState, Workers) {
    let registry: Arc<dyn Registry> = coordinator_registry::shared();
    let store = Arc::new(InMemoryEventStore::new());
    let event_store: Arc<dyn EventStore> = store.clone();
    let outbox: Arc<dyn OutboxStore> = store;
    let broker: Arc<dyn Broker> = Arc::new(NullBroker);

    build(registry, event_store, outbox, broker, config)
}

/// Wires an already-constructed Registry, Event Store, and Broker into an
/// `AppState` plus their background workers. Kept separate from
/// `build_in_memory` so a Postgres/Redis-backed `main` can supply its own
/// components without duplicating the worker-spawning logic.
pub fn build(
    registry: Arc<dyn Registry>,
    event_store: Arc<dyn EventStore>,
    outbox: Arc<dyn OutboxStore>,
    broker: Arc<dyn Broker>,
    config: Arc<CoordinatorConfig>,
) -> (AppState, Workers) {
    let router = Arc::new(CommandRouter::new(registry.clone()));

    let health = spawn_health_monitor(
        registry.clone(),
        config.health_scan_interval(),
        config.health_ttl(),
    );

    let publisher = coordinator_publisher::spawn_publisher(
        event_store.clone(),
        outbox.clone(),
        broker,
        PublisherConfig {
            max_attempts: config.publisher_max_attempts,
            backoff_ceiling: config.publisher_backoff_ceiling(),
            ..PublisherConfig::default()
        },
    );

    let state = AppState {
        registry,
        router,
        event_store,
        outbox,
        config,
        http: reqwest::Client::new(),
    };

    (state, Workers { health, publisher })
}

pub fn build_app(state: AppState) -> AxumRouter {
    build_router(state)
}

/// Builds a Postgres-backed server: durable events/outbox via
/// `PostgresEventStore`, everything else unchanged from [`build`].
#[cfg(feature = "postgres")]
pub async fn build_postgres(
    database_url: &str,
    broker: Arc<dyn Broker>,
    config: Arc<CoordinatorConfig>,
) -> Result<(AppState, Workers), String> {
    let pool = sqlx::PgPool::connect(database_url)
        .await
        .map_err(|e| e.to_string())?;

    let registry: Arc<dyn Registry> = coordinator_registry::shared();
    let store = Arc::new(coordinator_eventstore::PostgresEventStore::new(pool));
    let event_store: Arc<dyn EventStore> = store.clone();
    let outbox: Arc<dyn OutboxStore> = store;

    Ok(build(registry, event_store, outbox, broker, config))
}

/// Connects to Redis at `redis_url` for broker delivery. Returns an error
/// message suitable for logging if the connection cannot be established.
pub async fn redis_broker(redis_url: &str) -> Result<Arc<dyn Broker>, String> {
    let broker = RedisStreamsBroker::connect(redis_url)
        .await
        .map_err(|e| e.to_string())?;
    Ok(Arc::new(broker))
}

/// A broker that accepts nothing; used when no broker is configured. Outbox
/// entries will retry and eventually dead-letter, same as a genuinely down
/// broker would produce, which is the honest behavior for "not configured".
struct NullBroker;

#[async_trait::async_trait]
impl Broker for NullBroker {
    async fn publish(
        &self,
        _topic: &str,
        _partition_key: &str,
        _payload: &[u8],
    ) -> Result<(), coordinator_publisher::BrokerError> {
        Err(coordinator_publisher::BrokerError::Unavailable(
            "no broker configured".to_string(),
        ))
    }
}
