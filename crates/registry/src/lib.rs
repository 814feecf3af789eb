//! The Registry (C1) and Health Monitor (C2): the live map of instances to
//! handler sets, and the TTL scan loop that keeps it honest.

mod health;
mod model;
mod store;

pub use health::{spawn_health_monitor, WorkerHandle};
pub use model::{
    Endpoint, HandlerBinding, HandlerKind, HandlerSets, HealthState, Instance,
    RegistrationSummary, UnregisterSelector,
};
pub use store::{shared, InMemoryRegistry, Registry, RegistryError};
