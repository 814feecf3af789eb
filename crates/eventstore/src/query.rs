//! Filters for `read_all`, used by projection rebuild.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub aggregate_type: Option<String>,
    pub event_type: Option<String>,
    pub occurred_after: Option<DateTime<Utc>>,
    pub occurred_before: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn matches(&self, aggregate_type: &str, event_type: &str, timestamp: DateTime<Utc>) -> bool {
        if let Some(ref t) = self.aggregate_type {
            if t != aggregate_type {
                return false;
            }
        }
        if let Some(ref t) = self.event_type {
            if t != event_type {
                return false;
            }
        }
        if let Some(after) = self.occurred_after {
            if timestamp < after {
                return false;
            }
        }
        if let Some(before) = self.occurred_before {
            if timestamp > before {
                return false;
            }
        }
        true
    }
}

/// Caps the page size `read_all` will return in one call, mirroring the
/// registry's bounded-staleness philosophy: unbounded result sets are a
/// footgun regardless of backing store.
pub const MAX_READ_ALL_LIMIT: usize = 1000;
