//! Opaque string identifiers.
//!
//! Both ids are plain strings rather than UUIDs: `InstanceId` is assigned by
//! the registering process (often a pod name or a human-chosen label), and
//! `AggregateId` must hash consistently for arbitrary UTF-8 (see
//! `coordinator_router::fnv1a_hash`), which a UUID newtype cannot guarantee
//! for non-UUID-shaped input.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

macro_rules! impl_string_newtype {
    ($t:ident, $name:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(String);

        impl $t {
            /// Create an identifier, rejecting the empty string.
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                if value.is_empty() {
                    return Err(DomainError::invalid_id(format!("{} must not be empty", $name)));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

impl_string_newtype!(InstanceId, "InstanceId");
impl_string_newtype!(AggregateId, "AggregateId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert!(InstanceId::new("").is_err());
        assert!(AggregateId::new("").is_err());
    }

    #[test]
    fn orders_lexicographically() {
        let a = InstanceId::new("inst-1").unwrap();
        let b = InstanceId::new("inst-2").unwrap();
        assert!(a < b);
    }

    #[test]
    fn accepts_multibyte_utf8() {
        let id = AggregateId::new("café-日本語-42").unwrap();
        assert_eq!(id.as_str(), "café-日本語-42");
    }
}

