//! JSON error bodies.
//!
//! Every failure carries an `error` summary and a human-readable `details`
//! string.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub details: String,
}

/// Body for requests missing `number` or `message`.
#[derive(Debug, Serialize)]
pub struct MissingFieldsBody {
    pub error: String,
    pub details: String,
    pub number_present: bool,
    pub message_present: bool,
}

pub fn error(status: StatusCode, error: impl Into<String>, details: impl Into<String>) -> Response {
    let body = ErrorBody {
        error: error.into(),
        details: details.into(),
    };
    (status, Json(body)).into_response()
}

pub fn bad_request(summary: impl Into<String>, details: impl Into<String>) -> Response {
    error(StatusCode::BAD_REQUEST, summary, details)
}

pub fn service_unavailable(summary: impl Into<String>, details: impl Into<String>) -> Response {
    error(StatusCode::SERVICE_UNAVAILABLE, summary, details)
}

pub fn missing_fields(number_present: bool, message_present: bool) -> Response {
    let body = MissingFieldsBody {
        error: "Missing required fields".to_string(),
        details: "both 'number' and 'message' must be non-empty".to_string(),
        number_present,
        message_present,
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

/// Unparseable JSON: neither field could be read.
pub fn invalid_body(details: impl Into<String>) -> Response {
    let body = MissingFieldsBody {
        error: "Invalid request body".to_string(),
        details: details.into(),
        number_present: false,
        message_present: false,
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}
