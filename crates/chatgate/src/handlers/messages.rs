//! Outbound message HTTP handlers.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::response;
use crate::sender::{SendError, SendRequest, ValidationError};
use crate::server::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// `number` may arrive as a JSON string or a bare JSON number.
#[derive(Deserialize)]
pub struct SendMessageBody {
    #[serde(default)]
    number: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    status: &'static str,
    message: &'static str,
    to: String,
    duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    timestamp: String,
}

#[derive(Serialize)]
pub struct ClearDuplicatesResponse {
    cleared: bool,
    previous_entries: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /send
pub async fn send_message(
    State(state): State<AppState>,
    payload: Result<Json<SendMessageBody>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return response::invalid_body(rejection.body_text()),
    };

    let request = SendRequest::new(
        field_as_string(body.number),
        field_as_string(body.message),
    );

    match state.sender.send_with_policy(request).await {
        Ok(outcome) => {
            let response = SendMessageResponse {
                status: "success",
                message: if outcome.deduped {
                    "Duplicate message suppressed"
                } else {
                    "Message sent"
                },
                to: outcome.to,
                duplicate: outcome.deduped,
                message_id: outcome.message_id,
                timestamp: Utc::now().to_rfc3339(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => send_error_response(e),
    }
}

/// DELETE /clear-duplicates
pub async fn clear_duplicates(State(state): State<AppState>) -> Json<ClearDuplicatesResponse> {
    let previous_entries = state.sender.clear_duplicates();
    Json(ClearDuplicatesResponse {
        cleared: true,
        previous_entries,
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn field_as_string(value: Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn send_error_response(err: SendError) -> Response {
    match err {
        SendError::Validation(ValidationError::MissingFields {
            number_present,
            message_present,
        }) => response::missing_fields(number_present, message_present),
        SendError::Validation(e @ ValidationError::InvalidRecipient(_)) => {
            response::bad_request("Invalid phone number", e.to_string())
        }
        e @ (SendError::ConnectionUnavailable { .. } | SendError::SendFailed(_)) => {
            response::service_unavailable("Failed to send message", e.to_string())
        }
    }
}
