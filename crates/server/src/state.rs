//! Process-wide wiring: one [`AppState`] is built once in `main` and shared
//! across every request via an `Extension`.

use std::sync::Arc;

use coordinator_config::CoordinatorConfig;
use coordinator_eventstore::{EventStore, OutboxStore};
use coordinator_registry::Registry;
use coordinator_router::Router as CommandRouter;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn Registry>,
    pub router: Arc<CommandRouter<dyn Registry>>,
    pub event_store: Arc<dyn EventStore>,
    pub outbox: Arc<dyn OutboxStore>,
    pub config: Arc<CoordinatorConfig>,
    pub http: reqwest::Client,
}
