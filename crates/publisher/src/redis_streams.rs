//! Redis Streams-backed [`Broker`]. Each topic is its own stream
//! (`coordinator:events:{topic}`), appended to with `XADD`. Consumer-side
//! acknowledgement and consumer groups are a concern of whatever downstream
//! service reads the stream, not of this publisher.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::instrument;

use crate::broker::{Broker, BrokerError};

const STREAM_PREFIX: &str = "coordinator:events";

#[derive(Clone)]
pub struct RedisStreamsBroker {
    conn: ConnectionManager,
}

impl RedisStreamsBroker {
    pub async fn connect(redis_url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        Ok(Self { conn })
    }

    fn stream_key(topic: &str) -> String {
        format!("{STREAM_PREFIX}:{topic}")
    }
}

#[async_trait]
impl Broker for RedisStreamsBroker {
    #[instrument(skip(self, payload), fields(topic, bytes = payload.len()))]
    async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        payload: &[u8],
    ) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let key = Self::stream_key(topic);

        let _: String = conn
            .xadd(
                &key,
                "*",
                &[("partition_key", partition_key), ("payload", &base64_encode(payload))],
            )
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        Ok(())
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    // XADD field values must be valid Redis bulk strings; JSON payloads are
    // already UTF-8 so this is a cheap escape-free path for the common case,
    // falling back to hex for anything that isn't.
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let mut out = String::with_capacity(bytes.len() * 2);
            for b in bytes {
                write!(out, "{b:02x}").expect("writing to String cannot fail");
            }
            out
        }
    }
}
