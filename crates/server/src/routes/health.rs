//! SendHeartbeat and the StreamHealth websocket variant (C2).

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Extension, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use axum::Json;
use coordinator_core::{ErrorCode, InstanceId};
use tracing::{info, warn};

use crate::dto::{AckResponse, SendHeartbeatRequest};
use crate::errors::{error_response, registry_error_response};
use crate::state::AppState;

pub async fn send_heartbeat(
    Extension(state): Extension<AppState>,
    Json(req): Json<SendHeartbeatRequest>,
) -> Response {
    let instance_id = match InstanceId::new(req.instance_id) {
        Ok(id) => id,
        Err(e) => return error_response(ErrorCode::Invalid, e.to_string()),
    };

    match state
        .registry
        .record_heartbeat(&instance_id, req.state, req.metadata, chrono::Utc::now())
        .await
    {
        Ok(()) => Json(AckResponse {
            success: true,
            message: "ok".to_string(),
        })
        .into_response(),
        Err(e) => registry_error_response(e),
    }
}

pub async fn stream_health(
    ws: WebSocketUpgrade,
    Extension(state): Extension<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, state))
}

/// Terminates the connection after `3 * heartbeatInterval` of silence, per
/// the unary heartbeat being canonical and this stream only advisory.
async fn handle_stream(mut socket: WebSocket, state: AppState) {
    let inactivity_timeout = state.config.stream_inactivity_timeout();

    loop {
        let next = tokio::time::timeout(inactivity_timeout, socket.recv()).await;
        let message = match next {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                warn!(error = %e, "health stream read error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                info!("health stream idle past inactivity timeout, closing");
                break;
            }
        };

        let Message::Text(text) = message else {
            continue;
        };

        let req: SendHeartbeatRequest = match serde_json::from_str(&text) {
            Ok(req) => req,
            Err(e) => {
                let _ = socket
                    .send(Message::Text(
                        serde_json::json!({"success": false, "message": e.to_string()}).to_string(),
                    ))
                    .await;
                continue;
            }
        };

        let instance_id = match InstanceId::new(req.instance_id) {
            Ok(id) => id,
            Err(e) => {
                let _ = socket
                    .send(Message::Text(
                        serde_json::json!({"success": false, "message": e.to_string()}).to_string(),
                    ))
                    .await;
                continue;
            }
        };

        let ack = match state
            .registry
            .record_heartbeat(&instance_id, req.state, req.metadata, chrono::Utc::now())
            .await
        {
            Ok(()) => serde_json::json!({"success": true, "message": "ok"}),
            Err(e) => serde_json::json!({"success": false, "message": e.to_string()}),
        };

        if socket.send(Message::Text(ack.to_string())).await.is_err() {
            break;
        }
    }
}
