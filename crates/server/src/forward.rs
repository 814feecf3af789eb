//! Forwards a routed command or query to the selected instance over HTTP.
//! The wire contract downstream instances implement is out of scope here;
//! this assumes a JSON POST to a well-known path on the instance endpoint,
//! the simplest contract that satisfies "forward and propagate the result".

use coordinator_registry::Endpoint;
use serde_json::Value as JsonValue;

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("instance unreachable: {0}")]
    Unreachable(String),
    #[error("instance returned a malformed response: {0}")]
    MalformedResponse(String),
    #[error("deadline exceeded forwarding to instance")]
    DeadlineExceeded,
}

pub async fn forward_command(
    client: &reqwest::Client,
    endpoint: &Endpoint,
    deadline: std::time::Duration,
    command_id: &str,
    command_type: &str,
    payload: &JsonValue,
) -> Result<JsonValue, ForwardError> {
    let url = format!("http://{}:{}/commands", endpoint.host, endpoint.port);
    let body = serde_json::json!({
        "commandId": command_id,
        "commandType": command_type,
        "payload": payload,
    });
    send(client, &url, body, deadline).await
}

pub async fn forward_query(
    client: &reqwest::Client,
    endpoint: &Endpoint,
    deadline: std::time::Duration,
    query_id: &str,
    query_type: &str,
    payload: &JsonValue,
) -> Result<JsonValue, ForwardError> {
    let url = format!("http://{}:{}/queries", endpoint.host, endpoint.port);
    let body = serde_json::json!({
        "queryId": query_id,
        "queryType": query_type,
        "payload": payload,
    });
    send(client, &url, body, deadline).await
}

async fn send(
    client: &reqwest::Client,
    url: &str,
    body: JsonValue,
    deadline: std::time::Duration,
) -> Result<JsonValue, ForwardError> {
    let response = tokio::time::timeout(deadline, client.post(url).json(&body).send())
        .await
        .map_err(|_| ForwardError::DeadlineExceeded)?
        .map_err(|e| ForwardError::Unreachable(e.to_string()))?;

    response
        .json::<JsonValue>()
        .await
        .map_err(|e| ForwardError::MalformedResponse(e.to_string()))
}
