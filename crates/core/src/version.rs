//! Expected-version semantics for optimistic concurrency on append.

use serde::{Deserialize, Serialize};

/// What the caller expects the current stream version to be before an
/// append is applied.
///
/// `Exact` is the common case: a command handler read the stream at version
/// N and wants its append to fail if anything else has appended since.
/// `Any` opts out of the check entirely (e.g. idempotent ingestion from an
/// upstream system that already deduplicates).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedVersion {
    Any,
    Exact(u64),
}

impl ExpectedVersion {
    /// Returns whether `current` satisfies this expectation.
    pub fn matches(&self, current: u64) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => *expected == current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_everything() {
        assert!(ExpectedVersion::Any.matches(0));
        assert!(ExpectedVersion::Any.matches(42));
    }

    #[test]
    fn exact_matches_only_its_value() {
        let v = ExpectedVersion::Exact(3);
        assert!(v.matches(3));
        assert!(!v.matches(4));
    }
}
