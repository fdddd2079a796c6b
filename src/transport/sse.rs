//! Legacy HTTP+SSE transport.
//!
//! A `GET` on the SSE endpoint opens a long-lived stream whose first event
//! (`endpoint`) tells the client where to `POST` its messages:
//! `<message_path>?sessionId=<id>`. Every server message is written to that
//! stream. The session ends when the stream is dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::ServerHandler;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::jsonrpc::{self, error_response, INTERNAL_ERROR, INVALID_REQUEST, PARSE_ERROR};
use super::{
    is_json_content, server_channels, spawn_server, sse_response, ClosingStream, ServerChannels,
    ServerHandle, SseFrame, Transport, TransportEvent, TransportObserver,
};
use crate::{AppError, Result};

/// Query parameter carrying the session id on the message path.
pub const SESSION_QUERY_PARAM: &str = "sessionId";

#[derive(Default)]
struct SseState {
    started: bool,
    closed: bool,
    channels: Option<ServerChannels>,
    outbound: Option<UnboundedReceiver<ServerJsonRpcMessage>>,
    server: Option<ServerHandle>,
    stream: Option<UnboundedSender<SseFrame>>,
}

/// SSE transport for one session.
pub struct SseTransport {
    session_id: String,
    message_path: String,
    observer: Arc<dyn TransportObserver>,
    inbound: UnboundedSender<ClientJsonRpcMessage>,
    state: Mutex<SseState>,
}

impl SseTransport {
    /// Create a transport whose clients post to `message_path`.
    #[must_use]
    pub fn new(message_path: impl Into<String>, observer: Arc<dyn TransportObserver>) -> Arc<Self> {
        let (inbound, outbound, channels) = server_channels();
        Arc::new(Self {
            session_id: Uuid::new_v4().to_string(),
            message_path: message_path.into(),
            observer,
            inbound,
            state: Mutex::new(SseState {
                channels: Some(channels),
                outbound: Some(outbound),
                ..SseState::default()
            }),
        })
    }

    /// URL the client posts its messages to.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}?{SESSION_QUERY_PARAM}={}",
            self.message_path, self.session_id
        )
    }

    /// Connect `server` to this transport. Allowed exactly once.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if the transport is closed or already
    /// connected.
    pub fn connect<S: ServerHandler>(self: &Arc<Self>, server: S) -> Result<ServerHandle> {
        let (channels, outbound) = {
            let mut state = self.lock();
            if state.closed {
                return Err(AppError::Transport("transport is closed".into()));
            }
            match (state.channels.take(), state.outbound.take()) {
                (Some(channels), Some(outbound)) => (channels, outbound),
                _ => {
                    return Err(AppError::Transport(
                        "transport already connected to a server".into(),
                    ))
                }
            }
        };

        let on_exit = Arc::downgrade(self);
        let handle = spawn_server(server, channels, move || {
            if let Some(transport) = on_exit.upgrade() {
                transport.close();
            }
        });
        tokio::spawn(Self::pump(Arc::downgrade(self), outbound));

        self.lock().server = Some(handle.clone());
        Ok(handle)
    }

    /// Open the event stream and announce the session.
    ///
    /// The stream starts with the `endpoint` event followed by a
    /// "connection established" log notification. Dropping the returned
    /// response body closes the transport.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if the transport is closed or its stream
    /// was already started.
    pub fn start(self: &Arc<Self>) -> Result<Response> {
        let (sender, frames) = mpsc::unbounded();
        {
            let mut state = self.lock();
            if state.closed {
                return Err(AppError::Transport("transport is closed".into()));
            }
            if state.started {
                return Err(AppError::Transport("SSE stream already started".into()));
            }
            state.started = true;
            let _ = sender.unbounded_send(SseFrame::named("endpoint", self.endpoint_url()));
            state.stream = Some(sender.clone());
        }

        self.observer
            .on_event(TransportEvent::Initialized(self.session_id.clone()));
        let _ = sender.unbounded_send(SseFrame::message(connection_established().to_string()));
        info!(session_id = %self.session_id, "SSE stream opened");

        let transport = Arc::downgrade(self);
        let frames = ClosingStream::new(frames, move || {
            if let Some(transport) = transport.upgrade() {
                transport.close();
            }
        });
        Ok(sse_response(frames))
    }

    /// Handle a `POST` to the message path.
    pub fn handle_post_message(&self, headers: &HeaderMap, body: &Bytes) -> Response {
        if !is_json_content(headers) {
            return error_response(
                StatusCode::BAD_REQUEST,
                INVALID_REQUEST,
                "Unsupported content-type: expected application/json",
            );
        }
        {
            let state = self.lock();
            if state.closed || state.stream.is_none() {
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_ERROR,
                    "SSE connection not established",
                );
            }
        }

        let body: Value = match serde_json::from_slice(body) {
            Ok(body) => body,
            Err(err) => {
                debug!(%err, session_id = %self.session_id, "rejecting unparseable message");
                return error_response(StatusCode::BAD_REQUEST, PARSE_ERROR, "Parse error");
            }
        };
        let messages = match jsonrpc::decode_client_messages(&jsonrpc::split_batch(body)) {
            Ok(messages) => messages,
            Err(err) => {
                debug!(%err, session_id = %self.session_id, "rejecting malformed message");
                return error_response(
                    StatusCode::BAD_REQUEST,
                    INVALID_REQUEST,
                    "Invalid Request: malformed JSON-RPC message",
                );
            }
        };

        for message in messages {
            if self.inbound.unbounded_send(message).is_err() {
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_ERROR,
                    "Internal error: protocol server unavailable",
                );
            }
        }

        (StatusCode::ACCEPTED, "Accepted").into_response()
    }

    async fn pump(transport: Weak<Self>, mut outbound: UnboundedReceiver<ServerJsonRpcMessage>) {
        while let Some(message) = outbound.next().await {
            let Some(transport) = transport.upgrade() else {
                break;
            };
            let data = match serde_json::to_string(&message) {
                Ok(data) => data,
                Err(err) => {
                    warn!(%err, "failed to encode server message");
                    continue;
                }
            };
            let state = transport.lock();
            if let Some(stream) = state.stream.as_ref() {
                let _ = stream.unbounded_send(SseFrame::message(data));
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for SseTransport {
    fn session_id(&self) -> Option<String> {
        Some(self.session_id.clone())
    }

    fn server_handle(&self) -> Option<ServerHandle> {
        self.lock().server.clone()
    }

    fn close(&self) {
        let announced = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.stream = None;
            state.channels = None;
            state.outbound = None;
            state.started
        };

        self.inbound.close_channel();
        if announced {
            info!(session_id = %self.session_id, "SSE transport closed");
            self.observer
                .on_event(TransportEvent::Closed(self.session_id.clone()));
        }
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// Log notification pushed right after the `endpoint` event.
fn connection_established() -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "notifications/message",
        "params": {
            "level": "info",
            "logger": "mermaid-mcp",
            "data": "SSE connection established",
        },
    })
}

/// Extract `sessionId` from a URI query string.
///
/// Returns `None` when the parameter is absent or empty.
#[must_use]
pub fn extract_session_id(query: Option<&str>) -> Option<String> {
    query.and_then(|q| {
        q.split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == SESSION_QUERY_PARAM)
            .map(|(_, v)| v.to_owned())
            .filter(|v| !v.is_empty())
    })
}
