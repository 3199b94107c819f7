//! Manual-control HTTP API.
//!
//! | Method | Path | Action |
//! |---|---|---|
//! | GET | `/health` | liveness and connection state |
//! | GET | `/gate` | gate status snapshot |
//! | POST | `/gate/open` | open, optional `{"autoCloseMs": n}` |
//! | POST | `/gate/close` | close |
//! | POST | `/connection/restart` | drop and re-establish the antenna link |
//!
//! Control endpoints answer `{success, message, state}`: 200 when the
//! request was carried out, 409 when the gate or connection state refused
//! it, 503 when the supervisor is gone.

use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use rfgate_gate::GateState;
use rfgate_network::{ControlHandle, ControlResponse, GateStatus, SupervisorError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

type ControlReply = (StatusCode, Json<ControlResponse>);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct OpenRequest {
    auto_close_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    device_id: u32,
    connected: bool,
    filter_applied: bool,
    state: GateState,
    reconnect_attempts: u32,
}

/// Build the API router around a supervisor handle.
pub fn router(handle: ControlHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/gate", get(gate_status))
        .route("/gate/open", post(open_gate))
        .route("/gate/close", post(close_gate))
        .route("/connection/restart", post(restart_connection))
        .with_state(handle)
}

async fn health(State(handle): State<ControlHandle>) -> Json<HealthResponse> {
    let status = handle.status();
    Json(HealthResponse {
        status: "ok",
        device_id: status.device_id,
        connected: status.connected,
        filter_applied: status.filter_applied,
        state: status.state,
        reconnect_attempts: status.reconnect_attempts,
    })
}

async fn gate_status(State(handle): State<ControlHandle>) -> Json<GateStatus> {
    Json(handle.status())
}

async fn open_gate(State(handle): State<ControlHandle>, body: Bytes) -> ControlReply {
    let request = if body.is_empty() {
        OpenRequest::default()
    } else {
        match serde_json::from_slice::<OpenRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Rejecting open request body");
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ControlResponse::failed(
                        format!("invalid request body: {e}"),
                        handle.status().state,
                    )),
                );
            }
        }
    };

    info!(auto_close_ms = ?request.auto_close_ms, "API open request");
    let result = handle
        .open(request.auto_close_ms.map(Duration::from_millis))
        .await;
    reply(&handle, result)
}

async fn close_gate(State(handle): State<ControlHandle>) -> ControlReply {
    info!("API close request");
    let result = handle.close().await;
    reply(&handle, result)
}

async fn restart_connection(State(handle): State<ControlHandle>) -> ControlReply {
    info!("API restart request");
    let result = handle.restart().await;
    reply(&handle, result)
}

fn reply(handle: &ControlHandle, result: Result<ControlResponse, SupervisorError>) -> ControlReply {
    match result {
        Ok(response) if response.success => (StatusCode::OK, Json(response)),
        Ok(response) => (StatusCode::CONFLICT, Json(response)),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ControlResponse::failed(e.to_string(), handle.status().state)),
        ),
    }
}
