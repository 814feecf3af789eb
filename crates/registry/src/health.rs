//! Health Monitor (C2): expires stale instances on a fixed scan interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::store::Registry;

/// Handle to a running scan loop. Dropping it leaves the loop running;
/// call `shutdown` for a graceful stop.
pub struct WorkerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

/// Scans the registry every `scan_interval` and transitions instances whose
/// last heartbeat is older than `health_ttl` to EXPIRED.
///
/// Guarantees at most `scan_interval` detection latency after TTL lapse, per
/// the Health Monitor's stated guarantee.
pub fn spawn_health_monitor(
    registry: Arc<dyn Registry>,
    scan_interval: Duration,
    health_ttl: Duration,
) -> WorkerHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(scan_interval);
        let ttl = chrono::Duration::from_std(health_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(90));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = chrono::Utc::now();
                    match registry.scan_expire(now, ttl).await {
                        Ok(expired) if !expired.is_empty() => {
                            info!(count = expired.len(), "health monitor expired stale instances");
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(error = %err, "health monitor scan failed");
                        }
                    }
                }
                _ = &mut shutdown_rx => {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Endpoint, HandlerSets};
    use crate::store::InMemoryRegistry;
    use coordinator_core::InstanceId;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn expires_stale_instance_within_one_scan() {
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
        let now = chrono::Utc::now();
        registry
            .register(
                InstanceId::new("svc-a").unwrap(),
                "svc".into(),
                Endpoint { host: "h".into(), port: 1 },
                HandlerSets::default(),
                BTreeMap::new(),
                None,
                now - chrono::Duration::seconds(200),
            )
            .await
            .unwrap();

        let handle = spawn_health_monitor(
            registry.clone(),
            Duration::from_millis(20),
            Duration::from_secs(90),
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.shutdown().await;

        let instance = registry
            .get_instance(&InstanceId::new("svc-a").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(instance.state, crate::model::HealthState::Expired);
    }
}
