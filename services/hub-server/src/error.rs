//! HTTP error responses (§7): every handler builds its error response
//! through one of these helpers so the wire shape (`HttpErrorEnvelope`) and
//! error code stay consistent across the surface.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hub_protocol::{HttpErrorEnvelope, error_codes};

pub fn json_error(status: StatusCode, code: &str, message: &str) -> Response {
    let body = HttpErrorEnvelope {
        code: code.to_owned(),
        message: message.to_owned(),
        details: None,
    };
    (status, Json(body)).into_response()
}

pub fn bad_request(message: &str) -> Response {
    json_error(StatusCode::BAD_REQUEST, error_codes::PROTOCOL_ERROR, message)
}

pub fn not_found(message: &str) -> Response {
    json_error(StatusCode::NOT_FOUND, error_codes::PROTOCOL_ERROR, message)
}

pub fn conflict(message: &str) -> Response {
    json_error(StatusCode::CONFLICT, error_codes::PROTOCOL_ERROR, message)
}

pub fn unauthorized() -> Response {
    json_error(StatusCode::UNAUTHORIZED, error_codes::AUTH_ERROR, "unauthorized")
}

pub fn internal_error(message: &str) -> Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, error_codes::STORAGE_ERROR, message)
}
