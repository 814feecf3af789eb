//! Event Publisher (C5): drains the Event Store's outbox and delivers each
//! entry to the broker at least once, preserving per-aggregate (partition
//! key) order and giving up on an entry only after it has exhausted its
//! retry budget.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use coordinator_eventstore::{EventFilter, EventStore, OutboxEntry, OutboxStore};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::broker::Broker;

#[derive(Debug, Clone, Copy)]
pub struct PublisherConfig {
    pub max_attempts: u32,
    pub backoff_ceiling: Duration,
    pub poll_interval: Duration,
    pub batch_size: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_ceiling: Duration::from_secs(30),
            poll_interval: Duration::from_millis(200),
            batch_size: 100,
        }
    }
}

/// Exponential backoff, doubling per attempt, capped at `ceiling`. `attempts`
/// is the number of attempts already made, so the first retry (attempts=1)
/// waits one second.
fn backoff_for(attempts: u32, ceiling: Duration) -> Duration {
    let secs = 1u64.saturating_shl(attempts.min(20));
    Duration::from_secs(secs).min(ceiling)
}

pub struct WorkerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

/// Spawns the outbox-draining loop. Within one poll, entries sharing a
/// `partition_key` are delivered in ascending globalId order and a failed
/// entry blocks later entries on the same key from being attempted this
/// round, so the broker never sees an aggregate's events out of order.
pub fn spawn_publisher(
    event_store: Arc<dyn EventStore>,
    outbox: Arc<dyn OutboxStore>,
    broker: Arc<dyn Broker>,
    config: PublisherConfig,
) -> WorkerHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

    let join = tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.poll_interval);
        let mut next_eligible: HashMap<i64, Instant> = HashMap::new();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = drain_once(&*event_store, &*outbox, &*broker, config, &mut next_eligible).await {
                        warn!(error = %err, "outbox drain pass failed");
                    }
                }
                _ = &mut shutdown_rx => {
                    info!("publisher worker shutting down");
                    break;
                }
            }
        }
    });

    WorkerHandle {
        shutdown: Some(shutdown_tx),
        join: Some(join),
    }
}

#[instrument(skip_all)]
async fn drain_once(
    event_store: &dyn EventStore,
    outbox: &dyn OutboxStore,
    broker: &dyn Broker,
    config: PublisherConfig,
    next_eligible: &mut HashMap<i64, Instant>,
) -> Result<(), coordinator_eventstore::EventStoreError> {
    let pending = outbox.fetch_pending(config.batch_size).await?;
    let now = Instant::now();
    let mut blocked_partitions: HashSet<String> = HashSet::new();

    for entry in pending {
        if blocked_partitions.contains(&entry.partition_key) {
            continue;
        }
        if let Some(&eligible_at) = next_eligible.get(&entry.global_id) {
            if now < eligible_at {
                blocked_partitions.insert(entry.partition_key.clone());
                continue;
            }
        }

        match deliver(event_store, outbox, broker, &entry).await {
            Ok(()) => {
                next_eligible.remove(&entry.global_id);
            }
            Err(attempts) => {
                blocked_partitions.insert(entry.partition_key.clone());
                if attempts >= config.max_attempts {
                    outbox.dead_letter(entry.global_id).await?;
                    next_eligible.remove(&entry.global_id);
                } else {
                    let wait = backoff_for(attempts, config.backoff_ceiling);
                    next_eligible.insert(entry.global_id, now + wait);
                }
            }
        }
    }

    Ok(())
}

/// Delivers one entry. Looks the event back up by globalId so the broker
/// receives the full event body, not just the outbox routing fields.
/// Returns `Ok(())` on success or `Err(attempts)` with the post-increment
/// attempt count on failure.
async fn deliver(
    event_store: &dyn EventStore,
    outbox: &dyn OutboxStore,
    broker: &dyn Broker,
    entry: &OutboxEntry,
) -> Result<(), u32> {
    let bytes = match event_store
        .read_all(entry.global_id, EventFilter::default(), Some(1))
        .await
    {
        Ok(events) => match events.into_iter().find(|e| e.global_id == entry.global_id) {
            Some(event) => serde_json::to_vec(&serde_json::json!({
                "globalId": event.global_id,
                "aggregateId": event.aggregate_id.as_str(),
                "aggregateType": event.aggregate_type,
                "sequenceNumber": event.sequence_number,
                "eventType": event.event_type,
                "payload": event.payload,
                "metadata": event.metadata,
                "timestamp": event.timestamp,
                "topic": entry.topic,
            }))
            .unwrap_or_default(),
            None => {
                warn!(global_id = entry.global_id, "outbox entry has no matching event, skipping delivery");
                return Err(entry.attempts + 1);
            }
        },
        Err(e) => {
            warn!(global_id = entry.global_id, error = %e, "failed to look up event for outbox delivery");
            return Err(entry.attempts + 1);
        }
    };

    match broker.publish(&entry.topic, &entry.partition_key, &bytes).await {
        Ok(()) => {
            if let Err(e) = outbox.mark_published(entry.global_id).await {
                warn!(global_id = entry.global_id, error = %e, "failed to mark outbox entry published");
            }
            Ok(())
        }
        Err(broker_err) => {
            match outbox
                .mark_attempt_failed(entry.global_id, &broker_err.to_string())
                .await
            {
                Ok(updated) => Err(updated.attempts),
                Err(e) => {
                    warn!(global_id = entry.global_id, error = %e, "failed to record outbox delivery failure");
                    Err(entry.attempts + 1)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordinator_eventstore::InMemoryEventStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FlakyBroker {
        fail_first_n: usize,
        calls: AtomicUsize,
        delivered: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl Broker for FlakyBroker {
        async fn publish(
            &self,
            topic: &str,
            partition_key: &str,
            _payload: &[u8],
        ) -> Result<(), crate::broker::BrokerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first_n {
                return Err(crate::broker::BrokerError::Unavailable("flaky".into()));
            }
            self.delivered
                .lock()
                .unwrap()
                .push((topic.to_string(), partition_key.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivers_after_transient_failure_and_advances_eligibility() {
        use coordinator_core::{AggregateId, ExpectedVersion};

        let store = Arc::new(InMemoryEventStore::new());
        let aggregate_id = AggregateId::new("A").unwrap();
        store
            .append(
                &aggregate_id,
                "Widget",
                ExpectedVersion::Exact(1),
                coordinator_eventstore::NewEvent {
                    event_type: "Created".into(),
                    payload: serde_json::json!({}),
                    metadata: Default::default(),
                },
            )
            .await
            .unwrap();

        let broker = Arc::new(FlakyBroker {
            fail_first_n: 1,
            calls: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        });

        let config = PublisherConfig {
            backoff_ceiling: Duration::from_millis(1),
            ..Default::default()
        };
        let mut next_eligible = HashMap::new();

        drain_once(&*store, &*store, &*broker, config, &mut next_eligible)
            .await
            .unwrap();
        assert!(broker.delivered.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(5)).await;
        drain_once(&*store, &*store, &*broker, config, &mut next_eligible)
            .await
            .unwrap();
        assert_eq!(broker.delivered.lock().unwrap().len(), 1);
    }
}
