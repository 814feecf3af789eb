//! Maps the core error taxonomy onto HTTP status codes and a stable JSON
//! error body carrying the RPC-level error code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use coordinator_core::ErrorCode;
use serde_json::json;

pub fn error_response(code: ErrorCode, message: impl Into<String>) -> Response {
    let status = match code {
        ErrorCode::Ok => StatusCode::OK,
        ErrorCode::Invalid => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Concurrency => StatusCode::CONFLICT,
        ErrorCode::NoHandler => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::RegistryUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::StorageTransient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::StorageFatal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCode::BrokerUnavailable => StatusCode::BAD_GATEWAY,
        ErrorCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(json!({
            "errorCode": code.to_string(),
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn registry_error_response(err: coordinator_registry::RegistryError) -> Response {
    use coordinator_registry::RegistryError;
    match err {
        RegistryError::Invalid(msg) => error_response(ErrorCode::Invalid, msg),
        RegistryError::Unavailable(msg) => error_response(ErrorCode::RegistryUnavailable, msg),
    }
}

pub fn router_error_response(err: coordinator_router::RouterError) -> Response {
    use coordinator_router::RouterError;
    match err {
        RouterError::NoHandler { kind, type_name } => error_response(
            ErrorCode::NoHandler,
            format!("no healthy handler for {kind:?} {type_name}"),
        ),
        RouterError::RegistryUnavailable(msg) => error_response(ErrorCode::RegistryUnavailable, msg),
    }
}

pub fn eventstore_error_response(err: coordinator_eventstore::EventStoreError) -> Response {
    error_response(err.code(), err.to_string())
}
