mod dispatch;
mod events;
mod health;
mod registry;

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router as AxumRouter;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn build_router(state: AppState) -> AxumRouter {
    AxumRouter::new()
        .route("/health", get(liveness))
        .route("/registry/handlers", post(registry::register_handlers))
        .route("/registry/handlers/unregister", post(registry::unregister_handlers))
        .route("/registry/handlers/discover", get(registry::discover_handlers))
        .route("/health/heartbeat", post(health::send_heartbeat))
        .route("/health/stream", get(health::stream_health))
        .route("/commands", post(dispatch::submit_command))
        .route("/queries", post(dispatch::submit_query))
        .route("/events", post(events::submit_event))
        .route("/events/stream", get(events::read_all))
        .route("/events/:aggregate_id", get(events::read_events))
        .route("/snapshots", post(events::save_snapshot))
        .route("/snapshots/:aggregate_id", get(events::latest_snapshot))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}

async fn liveness() -> StatusCode {
    StatusCode::OK
}
