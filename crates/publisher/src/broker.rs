//! Broker abstraction the Publisher drains the outbox into. Kept separate
//! from the outbox model so a non-Redis broker can be substituted without
//! touching the draining worker.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("broker rejected publish: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Publishes `payload` to `topic`, tagged with `partition_key` so
    /// consumers that care about per-aggregate ordering can group on it.
    async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        payload: &[u8],
    ) -> Result<(), BrokerError>;
}
