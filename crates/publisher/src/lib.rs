//! Event Publisher (C5): the outbox-to-broker bridge. Decoupled from the
//! Event Store's write path so a broker outage degrades to growing outbox
//! backlog rather than blocking command handling.

mod broker;
mod redis_streams;
mod worker;

pub use broker::{Broker, BrokerError};
pub use redis_streams::RedisStreamsBroker;
pub use worker::{spawn_publisher, PublisherConfig, WorkerHandle};
