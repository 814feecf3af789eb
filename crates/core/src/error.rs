//! Domain error model and the wire-level error taxonomy.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts, routing). Infrastructure concerns (storage
/// transience, broker unavailability) carry their own error types further
/// down the stack and are mapped to [`ErrorCode`] independently.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. empty string, parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale expected version on append).
    #[error("conflict: {0}")]
    Conflict(String),

    /// No registered instance could handle the request.
    #[error("no handler: {0}")]
    NoHandler(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn no_handler(msg: impl Into<String>) -> Self {
        Self::NoHandler(msg.into())
    }

    /// Maps this domain error onto the wire-level error taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) | Self::InvariantViolation(_) | Self::InvalidId(_) => {
                ErrorCode::Invalid
            }
            Self::NotFound => ErrorCode::NotFound,
            Self::Conflict(_) => ErrorCode::Concurrency,
            Self::NoHandler(_) => ErrorCode::NoHandler,
        }
    }
}

/// The error taxonomy returned to callers across every RPC surface.
///
/// Every component (registry, router, event store, publisher) maps its own
/// internal errors onto this shared set rather than leaking implementation
/// detail to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Ok,
    Invalid,
    NotFound,
    Concurrency,
    NoHandler,
    RegistryUnavailable,
    StorageTransient,
    StorageFatal,
    BrokerUnavailable,
    DeadlineExceeded,
    Internal,
}

impl ErrorCode {
    /// True for errors a client may retry without changing the request.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RegistryUnavailable
                | Self::StorageTransient
                | Self::BrokerUnavailable
                | Self::DeadlineExceeded
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::Invalid => "INVALID",
            Self::NotFound => "NOT_FOUND",
            Self::Concurrency => "CONCURRENCY",
            Self::NoHandler => "NO_HANDLER",
            Self::RegistryUnavailable => "REGISTRY_UNAVAILABLE",
            Self::StorageTransient => "STORAGE_TRANSIENT",
            Self::StorageFatal => "STORAGE_FATAL",
            Self::BrokerUnavailable => "BROKER_UNAVAILABLE",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_concurrency() {
        assert_eq!(DomainError::conflict("stale version").code(), ErrorCode::Concurrency);
    }

    #[test]
    fn retryable_codes() {
        assert!(ErrorCode::StorageTransient.is_retryable());
        assert!(!ErrorCode::Invalid.is_retryable());
    }
}

