//! Event Store error taxonomy.

use coordinator_core::ErrorCode;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EventStoreError {
    /// `(aggregateId, expectedSequenceNumber)` was already taken. Not
    /// retried internally; the caller is expected to reload and retry.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// Malformed request (e.g. snapshot sequence ahead of the stream).
    #[error("invalid request: {0}")]
    Invalid(String),

    /// A storage failure expected to clear on retry.
    #[error("transient storage error: {0}")]
    StorageTransient(String),

    /// A storage failure that will not clear on retry; logged and surfaced.
    #[error("fatal storage error: {0}")]
    StorageFatal(String),
}

impl EventStoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Concurrency(_) => ErrorCode::Concurrency,
            Self::Invalid(_) => ErrorCode::Invalid,
            Self::StorageTransient(_) => ErrorCode::StorageTransient,
            Self::StorageFatal(_) => ErrorCode::StorageFatal,
        }
    }
}
