//! Configuration surface for the coordination server.
//!
//! Every tunable named in the external interface (heartbeat cadence, health
//! TTL, deadlines, publisher retry policy) lives here as one flat struct with
//! `serde(default = ...)` per field, so a partial JSON/env override still
//! produces a fully-populated config.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Broker topic partitioning strategy for the Event Publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrokerTopicStrategy {
    PerEventType,
    SingleTopic,
}

/// Full configuration for a coordinator process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Address to bind the RPC surface to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Expected interval between instance heartbeats.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Duration of inactivity after which an instance is marked EXPIRED.
    #[serde(default = "default_health_ttl_secs")]
    pub health_ttl_secs: u64,

    /// Interval at which the Health Monitor scans for expired instances.
    #[serde(default = "default_health_scan_interval_secs")]
    pub health_scan_interval_secs: u64,

    /// Bounded staleness window for registry reads (W).
    #[serde(default = "default_registry_staleness_secs")]
    pub registry_staleness_secs: u64,

    /// Deadline applied to routing requests.
    #[serde(default = "default_route_deadline_secs")]
    pub route_deadline_secs: u64,

    /// Deadline applied to event store append requests.
    #[serde(default = "default_append_deadline_secs")]
    pub append_deadline_secs: u64,

    /// Maximum publish attempts before an outbox entry is dead-lettered.
    #[serde(default = "default_publisher_max_attempts")]
    pub publisher_max_attempts: u32,

    /// Ceiling on the Publisher's exponential backoff between retries.
    #[serde(default = "default_publisher_backoff_ceiling_secs")]
    pub publisher_backoff_ceiling_secs: u64,

    /// Number of failed subscriber deliveries before a message is routed to
    /// the per-topic dead-letter topic.
    #[serde(default = "default_poison_message_threshold")]
    pub poison_message_threshold: u32,

    /// Snapshot cadence, opaque to the core; left for external schedulers.
    #[serde(default = "default_snapshot_frequency")]
    pub snapshot_frequency: u64,

    /// How outbox entries map onto broker topics.
    #[serde(default = "default_broker_topic_strategy")]
    pub broker_topic_strategy: BrokerTopicStrategy,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7700
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_health_ttl_secs() -> u64 {
    90
}

fn default_health_scan_interval_secs() -> u64 {
    5
}

fn default_registry_staleness_secs() -> u64 {
    2
}

fn default_route_deadline_secs() -> u64 {
    5
}

fn default_append_deadline_secs() -> u64 {
    15
}

fn default_publisher_max_attempts() -> u32 {
    10
}

fn default_publisher_backoff_ceiling_secs() -> u64 {
    30
}

fn default_poison_message_threshold() -> u32 {
    3
}

fn default_snapshot_frequency() -> u64 {
    1000
}

fn default_broker_topic_strategy() -> BrokerTopicStrategy {
    BrokerTopicStrategy::PerEventType
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            health_ttl_secs: default_health_ttl_secs(),
            health_scan_interval_secs: default_health_scan_interval_secs(),
            registry_staleness_secs: default_registry_staleness_secs(),
            route_deadline_secs: default_route_deadline_secs(),
            append_deadline_secs: default_append_deadline_secs(),
            publisher_max_attempts: default_publisher_max_attempts(),
            publisher_backoff_ceiling_secs: default_publisher_backoff_ceiling_secs(),
            poison_message_threshold: default_poison_message_threshold(),
            snapshot_frequency: default_snapshot_frequency(),
            broker_topic_strategy: default_broker_topic_strategy(),
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from a JSON file, falling back to defaults for any
    /// field the file omits.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn health_ttl(&self) -> Duration {
        Duration::from_secs(self.health_ttl_secs)
    }

    pub fn health_scan_interval(&self) -> Duration {
        Duration::from_secs(self.health_scan_interval_secs)
    }

    pub fn registry_staleness(&self) -> Duration {
        Duration::from_secs(self.registry_staleness_secs)
    }

    pub fn route_deadline(&self) -> Duration {
        Duration::from_secs(self.route_deadline_secs)
    }

    pub fn append_deadline(&self) -> Duration {
        Duration::from_secs(self.append_deadline_secs)
    }

    pub fn publisher_backoff_ceiling(&self) -> Duration {
        Duration::from_secs(self.publisher_backoff_ceiling_secs)
    }

    /// Heartbeat stream inactivity threshold (3x the expected interval, per
    /// the StreamHealth termination rule).
    pub fn stream_inactivity_timeout(&self) -> Duration {
        self.heartbeat_interval() * 3
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("port cannot be 0".into()));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "heartbeat_interval_secs cannot be 0".into(),
            ));
        }
        if self.health_ttl_secs < self.heartbeat_interval_secs * 2 {
            return Err(ConfigError::InvalidValue(
                "health_ttl_secs should be at least 2x heartbeat_interval_secs".into(),
            ));
        }
        if self.publisher_max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "publisher_max_attempts cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Serialize(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(s) => write!(f, "I/O error: {s}"),
            Self::Parse(s) => write!(f, "parse error: {s}"),
            Self::Serialize(s) => write!(f, "serialize error: {s}"),
            Self::InvalidValue(s) => write!(f, "invalid value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = CoordinatorConfig::default();
        assert_eq!(cfg.heartbeat_interval_secs, 30);
        assert_eq!(cfg.health_ttl_secs, 90);
        assert_eq!(cfg.health_scan_interval_secs, 5);
        assert_eq!(cfg.registry_staleness_secs, 2);
        assert_eq!(cfg.route_deadline_secs, 5);
        assert_eq!(cfg.append_deadline_secs, 15);
        assert_eq!(cfg.publisher_max_attempts, 10);
        assert_eq!(cfg.publisher_backoff_ceiling_secs, 30);
        assert_eq!(cfg.poison_message_threshold, 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let partial = r#"{"port": 9000}"#;
        let cfg: CoordinatorConfig = serde_json::from_str(partial).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.heartbeat_interval_secs, 30);
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = CoordinatorConfig {
            port: 1234,
            ..Default::default()
        };
        cfg.to_file(&path).unwrap();
        let loaded = CoordinatorConfig::from_file(&path).unwrap();
        assert_eq!(loaded.port, 1234);
    }

    #[test]
    fn rejects_zero_port() {
        let cfg = CoordinatorConfig {
            port: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_ttl_shorter_than_two_heartbeats() {
        let cfg = CoordinatorConfig {
            heartbeat_interval_secs: 30,
            health_ttl_secs: 40,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
