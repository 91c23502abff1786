//! Network transport: the JSON-RPC envelope over HTTP.
//!
//! One POST route at the configured path carries MCP messages into the
//! same dispatch the stdio loop uses; `GET /healthz` serves the status
//! document for probes. Concurrent clients share the one server (and
//! with it the one backend handle).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use std::sync::Arc;

use crate::server::McpServer;

pub fn router(server: Arc<McpServer>, path: &str) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route(path, post(rpc))
        .with_state(server)
}

async fn health(State(server): State<Arc<McpServer>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::to_value(&server.state().status).unwrap_or(Value::Null)),
    )
}

async fn rpc(State(server): State<Arc<McpServer>>, body: String) -> impl IntoResponse {
    match server.handle_message(body.trim()).await {
        Some(response) => (
            StatusCode::OK,
            Json(serde_json::to_value(&response).unwrap_or(Value::Null)),
        ),
        // A notification: nothing to send back.
        None => (StatusCode::ACCEPTED, Json(Value::Null)),
    }
}
