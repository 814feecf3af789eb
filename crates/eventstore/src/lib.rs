//! Event Store (C4): the durable, append-only record of everything that has
//! happened to every aggregate, plus the outbox handoff used by the
//! Publisher (C5).

mod error;
mod in_memory;
mod model;
#[cfg(feature = "postgres")]
mod postgres;
mod query;
#[path = "trait.rs"]
mod r#trait;

pub use error::EventStoreError;
pub use in_memory::InMemoryEventStore;
pub use model::{NewEvent, OutboxEntry, OutboxStatus, Snapshot, StoredEvent};
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use query::{EventFilter, MAX_READ_ALL_LIMIT};
pub use r#trait::{EventStore, OutboxStore};
