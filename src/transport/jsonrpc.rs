//! JSON-RPC envelope helpers shared by the transports and the controller.
//!
//! Messages are classified on their raw JSON shape so routing decisions do
//! not depend on the protocol crate's message enums.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rmcp::model::ClientJsonRpcMessage;
use serde_json::{json, Value};

/// No valid session id accompanied the request.
pub const NO_VALID_SESSION: i64 = -32000;
/// Body is not valid JSON.
pub const PARSE_ERROR: i64 = -32700;
/// Body is JSON but not a valid JSON-RPC message.
pub const INVALID_REQUEST: i64 = -32600;
/// Unexpected server-side failure.
pub const INTERNAL_ERROR: i64 = -32603;

/// Build `{jsonrpc:"2.0", id:null, error:{code, message}}`.
#[must_use]
pub fn error_envelope(code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": { "code": code, "message": message },
    })
}

/// HTTP response carrying a JSON-RPC error envelope.
#[must_use]
pub fn error_response(status: StatusCode, code: i64, message: &str) -> Response {
    (status, Json(error_envelope(code, message))).into_response()
}

/// The canonical rejection for a missing or unknown session id.
#[must_use]
pub fn no_valid_session() -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        NO_VALID_SESSION,
        "Bad Request: No valid session ID provided",
    )
}

/// Whether a message carries a request (`method` and `id`).
#[must_use]
pub fn is_request(message: &Value) -> bool {
    message.get("method").is_some() && message.get("id").is_some_and(|id| !id.is_null())
}

/// Whether a message is an `initialize` request.
#[must_use]
pub fn is_initialize_message(message: &Value) -> bool {
    is_request(message) && message.get("method").and_then(Value::as_str) == Some("initialize")
}

/// Flatten a single message or batch into individual messages.
#[must_use]
pub fn split_batch(body: Value) -> Vec<Value> {
    match body {
        Value::Array(messages) => messages,
        other => vec![other],
    }
}

/// Key identifying a request's JSON-RPC id.
///
/// Numeric and string ids with the same digits map to different keys.
#[must_use]
pub fn request_key(message: &Value) -> Option<String> {
    if is_request(message) {
        message.get("id").map(Value::to_string)
    } else {
        None
    }
}

/// Decode client messages for delivery to the protocol server.
///
/// # Errors
///
/// Returns the offending message's decode error text.
pub fn decode_client_messages(
    messages: &[Value],
) -> std::result::Result<Vec<ClientJsonRpcMessage>, String> {
    messages
        .iter()
        .map(|message| {
            serde_json::from_value::<ClientJsonRpcMessage>(message.clone())
                .map_err(|err| err.to_string())
        })
        .collect()
}
