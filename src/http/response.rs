//! HTTP rendering of [`AppError`].
//!
//! Client-facing messages never carry collaborator detail; 5xx causes are
//! logged here instead.

use std::any::Any;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use crate::transport::jsonrpc::{error_response, no_valid_session, INTERNAL_ERROR};
use crate::AppError;

/// `{error:{message}}` body used by the REST surface.
#[must_use]
pub fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": { "message": message } }))).into_response()
}

/// Response for a request no route accepts.
#[must_use]
pub fn not_found() -> Response {
    error_body(StatusCode::NOT_FOUND, "Not found")
}

/// Render `err` for a protocol endpoint.
///
/// Session failures keep the `-32000` rejection; anything else is a 500
/// with a `-32603` envelope.
#[must_use]
pub fn protocol_error(err: AppError) -> Response {
    match err {
        AppError::Session(_) => err.into_response(),
        other => {
            error!(err = %other, "protocol request failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                INTERNAL_ERROR,
                "Internal error",
            )
        }
    }
}

/// Response for a request whose handler panicked.
///
/// The envelope's `error.message` also satisfies REST clients.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    error!(panic = %detail, "request handler panicked");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_ERROR,
        "Internal error",
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Session(msg) => {
                warn!(%msg, "session rejected");
                no_valid_session()
            }
            Self::Unauthorized(msg) => error_body(StatusCode::UNAUTHORIZED, &msg),
            Self::Validation(msg) => error_body(StatusCode::BAD_REQUEST, &msg),
            Self::Render(_) => {
                error!(err = %self, "render request failed");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to render diagram")
            }
            Self::Storage(_) => {
                error!(err = %self, "render upload failed");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store rendered diagram")
            }
            other => {
                error!(err = %other, "request failed");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}
