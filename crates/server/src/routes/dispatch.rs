//! SubmitCommand and SubmitQuery: route then forward (C3 + downstream
//! instance), propagating whatever the selected instance returns.

use axum::extract::Extension;
use axum::response::{IntoResponse, Response};
use axum::Json;
use coordinator_core::{AggregateId, ErrorCode};
use coordinator_registry::HandlerKind;

use crate::dto::{SubmitCommandRequest, SubmitCommandResponse, SubmitQueryRequest};
use crate::errors::{error_response, registry_error_response, router_error_response};
use crate::forward::{forward_command, forward_query, ForwardError};
use crate::state::AppState;

pub async fn submit_command(
    Extension(state): Extension<AppState>,
    Json(req): Json<SubmitCommandRequest>,
) -> Response {
    let aggregate_id = match AggregateId::new(req.aggregate_id) {
        Ok(id) => id,
        Err(e) => return error_response(ErrorCode::Invalid, e.to_string()),
    };

    let instance_id = match state
        .router
        .route(HandlerKind::Command, &req.command_type, Some(&aggregate_id))
        .await
    {
        Ok(id) => id,
        Err(e) => return router_error_response(e),
    };

    let instance = match state.registry.get_instance(&instance_id).await {
        Ok(Some(instance)) => instance,
        Ok(None) => {
            return error_response(
                ErrorCode::NoHandler,
                format!("instance {instance_id} vanished between route and forward"),
            )
        }
        Err(e) => return registry_error_response(e),
    };

    let deadline = state.config.route_deadline();
    match forward_command(
        &state.http,
        &instance.endpoint,
        deadline,
        &req.command_id,
        &req.command_type,
        &req.payload,
    )
    .await
    {
        Ok(result) => Json(SubmitCommandResponse {
            success: true,
            result: Some(result),
            error_code: None,
        })
        .into_response(),
        Err(ForwardError::DeadlineExceeded) => error_response(ErrorCode::DeadlineExceeded, "forwarding timed out"),
        Err(e) => Json(SubmitCommandResponse {
            success: false,
            result: None,
            error_code: Some(forward_error_code(&e).to_string()),
        })
        .into_response(),
    }
}

pub async fn submit_query(
    Extension(state): Extension<AppState>,
    Json(req): Json<SubmitQueryRequest>,
) -> Response {
    let instance_id = match state.router.route(HandlerKind::Query, &req.query_type, None).await {
        Ok(id) => id,
        Err(e) => return router_error_response(e),
    };

    let instance = match state.registry.get_instance(&instance_id).await {
        Ok(Some(instance)) => instance,
        Ok(None) => {
            return error_response(
                ErrorCode::NoHandler,
                format!("instance {instance_id} vanished between route and forward"),
            )
        }
        Err(e) => return registry_error_response(e),
    };

    let deadline = state.config.route_deadline();
    match forward_query(
        &state.http,
        &instance.endpoint,
        deadline,
        &req.query_id,
        &req.query_type,
        &req.payload,
    )
    .await
    {
        Ok(result) => Json(result).into_response(),
        Err(ForwardError::DeadlineExceeded) => error_response(ErrorCode::DeadlineExceeded, "forwarding timed out"),
        Err(e) => error_response(ErrorCode::Internal, e.to_string()),
    }
}

fn forward_error_code(err: &ForwardError) -> ErrorCode {
    match err {
        ForwardError::Unreachable(_) => ErrorCode::NoHandler,
        ForwardError::MalformedResponse(_) => ErrorCode::Internal,
        ForwardError::DeadlineExceeded => ErrorCode::DeadlineExceeded,
    }
}
