//! Service status and descriptor handlers.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};

use super::version::VERSION;
use crate::connection::ConnectionState;
use crate::server::AppState;

#[derive(Serialize)]
pub struct StatusResponse {
    connected: bool,
    status: &'static str,
    state: ConnectionState,
    retry_count: u32,
    max_retries: u32,
    pairing_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_disconnect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    connected_since: Option<String>,
    duplicate_entries: usize,
    duplicate_window_seconds: u64,
    uptime_seconds: u64,
    timestamp: String,
}

/// GET /status
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let connection = state.connection.status().await;
    let dedup = state.sender.dedup();

    Json(StatusResponse {
        connected: connection.ready,
        status: if connection.ready {
            "connected"
        } else {
            "disconnected"
        },
        state: connection.state,
        retry_count: connection.retry_count,
        max_retries: connection.max_retries,
        pairing_required: connection.pairing_required,
        last_disconnect: connection.last_disconnect,
        connected_since: connection.connected_since.map(|t| t.to_rfc3339()),
        duplicate_entries: dedup.len(),
        duplicate_window_seconds: dedup.window().as_secs(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// GET /
pub async fn index() -> Json<Value> {
    Json(json!({
        "service": "chatgate",
        "version": VERSION,
        "description": "Send messages over a persistent chat session",
        "endpoints": {
            "POST /send": "send a message: {\"number\": \"...\", \"message\": \"...\"}",
            "GET /status": "connection status and diagnostics",
            "DELETE /clear-duplicates": "reset the duplicate-suppression cache",
            "GET /livez": "liveness probe",
            "GET /readyz": "readiness probe, 503 until the session is connected",
            "GET /version": "service version",
        },
    }))
}
