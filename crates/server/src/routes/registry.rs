//! RegisterHandlers, UnregisterHandlers, DiscoverHandlers (C1).

use axum::extract::{Extension, Query};
use axum::response::{IntoResponse, Response};
use axum::Json;
use coordinator_core::{ErrorCode, InstanceId};
use coordinator_registry::{Endpoint, HandlerKind, HandlerSets, UnregisterSelector};

use crate::dto::{
    DiscoverHandlersQuery, DiscoverHandlersResponse, DiscoveredInstance,
    RegisterHandlersRequest, RegistrationSummaryResponse, UnregisterHandlersRequest,
    UnregistrationSummaryResponse,
};
use crate::errors::{error_response, registry_error_response};
use crate::state::AppState;

pub async fn register_handlers(
    Extension(state): Extension<AppState>,
    Json(req): Json<RegisterHandlersRequest>,
) -> Response {
    let instance_id = match InstanceId::new(req.instance_id) {
        Ok(id) => id,
        Err(e) => return error_response(ErrorCode::Invalid, e.to_string()),
    };

    let handlers = HandlerSets {
        command_types: req.command_types,
        query_types: req.query_types,
        event_types: req.event_types,
    };

    let result = state
        .registry
        .register(
            instance_id,
            req.service_name,
            Endpoint {
                host: req.host,
                port: req.port,
            },
            handlers,
            req.metadata,
            req.schema_map,
            chrono::Utc::now(),
        )
        .await;

    match result {
        Ok(summary) => Json(RegistrationSummaryResponse {
            success: summary.success(),
            message: "registered".to_string(),
            commands_registered: summary.commands_registered,
            queries_registered: summary.queries_registered,
            events_registered: summary.events_registered,
        })
        .into_response(),
        Err(e) => registry_error_response(e),
    }
}

pub async fn unregister_handlers(
    Extension(state): Extension<AppState>,
    Json(req): Json<UnregisterHandlersRequest>,
) -> Response {
    let instance_id = match InstanceId::new(req.instance_id) {
        Ok(id) => id,
        Err(e) => return error_response(ErrorCode::Invalid, e.to_string()),
    };

    let all_empty = req.command_types.is_empty() && req.query_types.is_empty() && req.event_types.is_empty();
    let subset = if all_empty {
        None
    } else {
        Some(UnregisterSelector {
            command_types: req.command_types.clone(),
            query_types: req.query_types.clone(),
            event_types: req.event_types.clone(),
        })
    };

    match state.registry.unregister(&instance_id, subset).await {
        Ok(()) => Json(UnregistrationSummaryResponse {
            commands_removed: req.command_types.len(),
            queries_removed: req.query_types.len(),
            events_removed: req.event_types.len(),
        })
        .into_response(),
        Err(e) => registry_error_response(e),
    }
}

pub async fn discover_handlers(
    Extension(state): Extension<AppState>,
    Query(q): Query<DiscoverHandlersQuery>,
) -> Response {
    let kind = match q.kind.to_uppercase().as_str() {
        "COMMAND" => HandlerKind::Command,
        "QUERY" => HandlerKind::Query,
        "EVENT" => HandlerKind::Event,
        other => {
            return error_response(ErrorCode::Invalid, format!("unknown handler kind: {other}"))
        }
    };
    let only_healthy = q.only_healthy.unwrap_or(true);

    let ids = match state
        .registry
        .list_instances_for_type(kind, &q.type_name, only_healthy)
        .await
    {
        Ok(ids) => ids,
        Err(e) => return registry_error_response(e),
    };

    let mut instances = Vec::with_capacity(ids.len());
    let mut healthy_count = 0usize;
    for id in &ids {
        match state.registry.get_instance(id).await {
            Ok(Some(instance)) => {
                if matches!(
                    instance.state,
                    coordinator_registry::HealthState::Healthy | coordinator_registry::HealthState::Degraded
                ) {
                    healthy_count += 1;
                }
                instances.push(DiscoveredInstance {
                    instance_id: instance.instance_id.into_inner(),
                    host: instance.endpoint.host,
                    port: instance.endpoint.port,
                    state: instance.state,
                });
            }
            Ok(None) => continue,
            Err(e) => return registry_error_response(e),
        }
    }

    Json(DiscoverHandlersResponse {
        total_count: instances.len(),
        healthy_count,
        instances,
    })
    .into_response()
}
