//! SubmitEvent, ReadEvents, ReadAll, SaveSnapshot, LatestSnapshot (C4).

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Extension, Path, Query};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use coordinator_core::{AggregateId, ErrorCode, ExpectedVersion};
use coordinator_eventstore::{EventFilter, NewEvent};
use tokio_stream::Stream;

use crate::dto::{
    EventRecord, ReadAllQuery, ReadEventsQuery, SaveSnapshotRequest, SnapshotResponse,
    SubmitEventRequest, SubmitEventResponse,
};
use crate::errors::{error_response, eventstore_error_response};
use crate::state::AppState;

pub async fn submit_event(
    Extension(state): Extension<AppState>,
    Json(req): Json<SubmitEventRequest>,
) -> Response {
    let aggregate_id = match AggregateId::new(req.aggregate_id) {
        Ok(id) => id,
        Err(e) => return error_response(ErrorCode::Invalid, e.to_string()),
    };

    let expected = match req.expected_sequence {
        Some(n) => ExpectedVersion::Exact(n),
        None => ExpectedVersion::Any,
    };

    let event = NewEvent {
        event_type: req.event_type,
        payload: req.payload,
        metadata: req.metadata,
    };

    match state
        .event_store
        .append(&aggregate_id, &req.aggregate_type, expected, event)
        .await
    {
        Ok(stored) => Json(SubmitEventResponse {
            global_id: stored.global_id,
            sequence_number: stored.sequence_number,
        })
        .into_response(),
        Err(e) => eventstore_error_response(e),
    }
}

pub async fn read_events(
    Extension(state): Extension<AppState>,
    Path(aggregate_id): Path<String>,
    Query(q): Query<ReadEventsQuery>,
) -> Response {
    let aggregate_id = match AggregateId::new(aggregate_id) {
        Ok(id) => id,
        Err(e) => return error_response(ErrorCode::Invalid, e.to_string()),
    };

    match state.event_store.read(&aggregate_id, q.from_sequence).await {
        Ok(events) => sse_of(events.into_iter().map(EventRecord::from)),
        Err(e) => eventstore_error_response(e),
    }
}

pub async fn read_all(Extension(state): Extension<AppState>, Query(q): Query<ReadAllQuery>) -> Response {
    let filter = EventFilter {
        aggregate_type: q.aggregate_type,
        event_type: q.event_type,
        occurred_after: None,
        occurred_before: None,
    };

    match state
        .event_store
        .read_all(q.from_global_id, filter, q.limit)
        .await
    {
        Ok(events) => sse_of(events.into_iter().map(EventRecord::from)),
        Err(e) => eventstore_error_response(e),
    }
}

/// A finite SSE stream: one `event` frame per record, then the stream ends.
/// Suitable for the bounded ReadEvents/ReadAll result sets; a genuinely live
/// tail would need a separate subscription mechanism, which these two
/// operations do not define.
fn sse_of(records: impl Iterator<Item = EventRecord>) -> Response {
    let frames: Vec<Result<SseEvent, Infallible>> = records
        .map(|r| {
            let data = serde_json::to_string(&r).unwrap_or_else(|_| "{}".to_string());
            Ok(SseEvent::default().event("event").data(data))
        })
        .collect();

    let stream: std::pin::Pin<Box<dyn Stream<Item = Result<SseEvent, Infallible>> + Send>> =
        Box::pin(tokio_stream::iter(frames));

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}

pub async fn save_snapshot(
    Extension(state): Extension<AppState>,
    Json(req): Json<SaveSnapshotRequest>,
) -> Response {
    let aggregate_id = match AggregateId::new(req.aggregate_id) {
        Ok(id) => id,
        Err(e) => return error_response(ErrorCode::Invalid, e.to_string()),
    };

    match state
        .event_store
        .save_snapshot(&aggregate_id, &req.aggregate_type, req.sequence_number, req.payload)
        .await
    {
        Ok(()) => Json(crate::dto::AckResponse {
            success: true,
            message: "snapshot saved".to_string(),
        })
        .into_response(),
        Err(e) => eventstore_error_response(e),
    }
}

pub async fn latest_snapshot(
    Extension(state): Extension<AppState>,
    Path(aggregate_id): Path<String>,
) -> Response {
    let aggregate_id = match AggregateId::new(aggregate_id) {
        Ok(id) => id,
        Err(e) => return error_response(ErrorCode::Invalid, e.to_string()),
    };

    match state.event_store.latest_snapshot(&aggregate_id).await {
        Ok(Some(snapshot)) => Json(SnapshotResponse::from(snapshot)).into_response(),
        Ok(None) => error_response(ErrorCode::NotFound, "no snapshot for aggregate"),
        Err(e) => eventstore_error_response(e),
    }
}
