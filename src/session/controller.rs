//! Session lifecycle controller.
//!
//! Resolves protocol requests to live sessions, creates sessions on a valid
//! `initialize` (streamable) or on stream open (SSE), and rejects everything
//! else with the no-valid-session envelope. Registry membership is driven
//! solely by transport lifecycle events delivered to a [`RegistryBinding`].
//!
//! Streamable requests that pass the session checks are handed to rmcp's
//! [`StreamableHttpService`]; its plain-text failures are rewritten into
//! JSON-RPC error envelopes on the way out.

use std::sync::{Arc, OnceLock, Weak};

use axum::body::{to_bytes, Body};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::manager::ObservedSessionManager;
use super::registry::SessionRegistry;
use super::{Session, SessionTransport};
use crate::http::response::protocol_error;
use crate::mcp::handler::MermaidServer;
use crate::transport::jsonrpc::{self, error_response, INTERNAL_ERROR, INVALID_REQUEST, PARSE_ERROR};
use crate::transport::sse::{extract_session_id, SseTransport};
use crate::transport::streamable::{
    is_event_id, InFlightRequest, StreamableOptions, StreamableSession, SSE_KEEP_ALIVE,
};
use crate::transport::{
    header_str, ClosingStream, Transport, TransportEvent, TransportObserver,
    LAST_EVENT_ID_HEADER, SESSION_ID_HEADER,
};
use crate::{AppError, Result};

/// Largest rmcp error body read back for rewriting.
const MAX_FAILURE_BODY_BYTES: usize = 16 * 1024;

/// Observer keeping the registry in step with one transport.
///
/// Inserts the session on [`TransportEvent::Initialized`] and removes it,
/// then closes its protocol server, on [`TransportEvent::Closed`].
pub struct RegistryBinding<T> {
    registry: SessionRegistry,
    transport: OnceLock<Weak<T>>,
}

impl<T> RegistryBinding<T>
where
    T: Transport + 'static,
    Arc<T>: Into<SessionTransport>,
{
    /// Create an unbound observer.
    #[must_use]
    pub fn new(registry: SessionRegistry) -> Arc<Self> {
        Arc::new(Self {
            registry,
            transport: OnceLock::new(),
        })
    }

    /// Attach the transport this observer reports for. Later calls are ignored.
    pub fn bind(&self, transport: &Arc<T>) {
        let _ = self.transport.set(Arc::downgrade(transport));
    }

    fn register(&self, id: String) {
        let Some(transport) = self.transport.get().and_then(Weak::upgrade) else {
            warn!(session_id = %id, "initialized transport is gone, not registering");
            return;
        };
        let Some(server) = transport.server_handle() else {
            warn!(session_id = %id, "initialized transport has no server, not registering");
            return;
        };

        let session = Session::new(id, transport.into(), server);
        let (session_id, mode) = (session.id().to_owned(), session.mode());
        if self.registry.insert(session) {
            info!(session_id = %session_id, %mode, "session registered");
        } else {
            warn!(session_id = %session_id, "duplicate session id ignored");
        }
    }

    fn unregister(&self, id: &str) {
        let Some(session) = self.registry.remove(id) else {
            debug!(session_id = id, "closed transport was not registered");
            return;
        };
        if let Err(err) = session.server().close() {
            warn!(%err, session_id = id, "failed to close protocol server");
        }
        info!(session_id = id, mode = %session.mode(), "session removed");
    }
}

impl<T> TransportObserver for RegistryBinding<T>
where
    T: Transport + 'static,
    Arc<T>: Into<SessionTransport>,
{
    fn on_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Initialized(id) => self.register(id),
            TransportEvent::Closed(id) => self.unregister(&id),
        }
    }
}

/// Routes protocol requests to sessions and owns session creation.
#[derive(Clone)]
pub struct SessionController {
    registry: SessionRegistry,
    prototype: MermaidServer,
    message_path: String,
    manager: Arc<ObservedSessionManager>,
    streamable: StreamableHttpService<MermaidServer, ObservedSessionManager>,
    shutdown: CancellationToken,
}

impl SessionController {
    /// Create a controller.
    ///
    /// Every new session gets a clone of `prototype` as its protocol server.
    #[must_use]
    pub fn new(
        registry: SessionRegistry,
        prototype: MermaidServer,
        options: &StreamableOptions,
        message_path: impl Into<String>,
    ) -> Self {
        let manager = ObservedSessionManager::new(registry.clone(), options.events_per_stream);
        let shutdown = CancellationToken::new();
        let config = StreamableHttpServerConfig {
            sse_keep_alive: Some(SSE_KEEP_ALIVE),
            sse_retry: options.sse_retry,
            stateful_mode: true,
            cancellation_token: shutdown.clone(),
        };
        let factory = prototype.clone();
        let streamable =
            StreamableHttpService::new(move || Ok(factory.clone()), Arc::clone(&manager), config);

        Self {
            registry,
            prototype,
            message_path: message_path.into(),
            manager,
            streamable,
            shutdown,
        }
    }

    /// Registry of live sessions.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// `POST` on the streamable endpoint.
    pub async fn handle_streamable_post(&self, parts: Parts, body: Bytes) -> Response {
        let message: Value = match serde_json::from_slice(&body) {
            Ok(message) => message,
            Err(err) => {
                debug!(%err, "rejecting unparseable streamable body");
                return error_response(
                    StatusCode::BAD_REQUEST,
                    PARSE_ERROR,
                    "Parse error: Invalid JSON",
                );
            }
        };
        if message.is_array() {
            return error_response(
                StatusCode::BAD_REQUEST,
                INVALID_REQUEST,
                "Invalid Request: batch messages are not supported",
            );
        }

        let Some(session_id) = header_str(&parts.headers, SESSION_ID_HEADER) else {
            if !jsonrpc::is_initialize_message(&message) {
                return AppError::Session("no session id and not an initialize request".into())
                    .into_response();
            }
            let span = info_span!("streamable_initialize");
            return self.forward(parts, Body::from(body)).instrument(span).await;
        };

        let session = match self.streamable(session_id) {
            Ok(session) => session,
            Err(err) => return err.into_response(),
        };
        let claim = match jsonrpc::request_key(&message) {
            Some(key) => match session.begin_request(key) {
                Some(claim) => Some(claim),
                None => {
                    return error_response(
                        StatusCode::BAD_REQUEST,
                        INVALID_REQUEST,
                        "Invalid Request: a request with this id is already in flight",
                    );
                }
            },
            None => None,
        };

        let span = info_span!("streamable_post", session_id = %session.id());
        let response = self.forward(parts, Body::from(body)).instrument(span).await;
        match claim {
            Some(claim) => release_when_drained(response, claim),
            None => response,
        }
    }

    /// `GET` on the streamable endpoint: open or resume the standalone stream.
    ///
    /// A `last-event-id` header resumes the stream it names, replaying the
    /// retained events from that id on.
    pub async fn handle_streamable_get(&self, parts: Parts) -> Response {
        let session = match self.streamable_from(&parts.headers) {
            Ok(session) => session,
            Err(err) => return err.into_response(),
        };
        if let Some(last_event_id) = header_str(&parts.headers, LAST_EVENT_ID_HEADER) {
            if !is_event_id(last_event_id) {
                debug!(session_id = %session.id(), last_event_id, "malformed last-event-id");
                return error_response(
                    StatusCode::BAD_REQUEST,
                    INVALID_REQUEST,
                    "Invalid Request: malformed last-event-id",
                );
            }
        }
        let span = info_span!("streamable_get", session_id = %session.id());
        self.forward(parts, Body::empty()).instrument(span).await
    }

    /// `DELETE` on the streamable endpoint.
    pub async fn handle_streamable_delete(&self, parts: Parts) -> Response {
        let session = match self.streamable_from(&parts.headers) {
            Ok(session) => session,
            Err(err) => return err.into_response(),
        };
        let span = info_span!("streamable_delete", session_id = %session.id());
        self.forward(parts, Body::empty()).instrument(span).await
    }

    /// `GET` on the SSE endpoint: open a new SSE session.
    ///
    /// Failures are answered with a `-32603` envelope.
    pub fn open_sse_session(&self) -> Response {
        self.start_sse().unwrap_or_else(protocol_error)
    }

    /// `POST` on the SSE message path.
    pub fn handle_sse_message(
        &self,
        query: Option<&str>,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Response {
        let Some(session_id) = extract_session_id(query) else {
            return AppError::Session("missing sessionId query parameter".into()).into_response();
        };
        let Some(transport) = self.sse(&session_id) else {
            return AppError::Session(format!("unknown SSE session {session_id}")).into_response();
        };
        transport.handle_post_message(headers, body)
    }

    /// Close every live session.
    ///
    /// Each transport's close notification removes its entry and stops its
    /// server, so the registry is empty afterwards. Open streamable streams
    /// end as well.
    pub fn cleanup(&self) {
        let sessions = self.registry.snapshot();
        if !sessions.is_empty() {
            info!(count = sessions.len(), "closing live sessions");
        }
        for session in sessions {
            session.transport().close();
        }
        self.manager.close_all();
        self.shutdown.cancel();
    }

    fn start_sse(&self) -> Result<Response> {
        let binding = RegistryBinding::<SseTransport>::new(self.registry.clone());
        let transport = SseTransport::new(self.message_path.clone(), binding.clone());
        binding.bind(&transport);
        transport.connect(self.prototype.clone())?;
        transport.start()
    }

    async fn forward(&self, parts: Parts, body: Body) -> Response {
        let response = self
            .streamable
            .handle(Request::from_parts(parts, body))
            .await
            .map(Body::new);
        if response.status().is_success() {
            return response;
        }
        rewrite_failure(response).await
    }

    fn streamable_from(&self, headers: &HeaderMap) -> Result<Arc<StreamableSession>> {
        let session_id = header_str(headers, SESSION_ID_HEADER)
            .ok_or_else(|| AppError::Session("missing mcp-session-id header".into()))?;
        self.streamable(session_id)
    }

    fn streamable(&self, session_id: &str) -> Result<Arc<StreamableSession>> {
        let session = self
            .registry
            .get(session_id)
            .ok_or_else(|| AppError::Session(format!("unknown session {session_id}")))?;
        match session.transport() {
            SessionTransport::Streamable(transport) => Ok(Arc::clone(transport)),
            SessionTransport::Sse(_) => Err(AppError::Session(format!(
                "session {session_id} is not a streamable session"
            ))),
        }
    }

    fn sse(&self, session_id: &str) -> Option<Arc<SseTransport>> {
        match self.registry.get(session_id)?.transport() {
            SessionTransport::Sse(transport) => Some(Arc::clone(transport)),
            SessionTransport::Streamable(_) => None,
        }
    }
}

/// Keep `claim` alive until the response body has been fully sent or dropped.
fn release_when_drained(response: Response, claim: InFlightRequest) -> Response {
    let (parts, body) = response.into_parts();
    let stream = ClosingStream::new(body.into_data_stream(), move || drop(claim));
    Response::from_parts(parts, Body::from_stream(stream))
}

/// Turn an rmcp plain-text failure into a JSON-RPC error envelope.
///
/// An unknown session becomes the canonical `-32000` rejection; other
/// client errors keep their status with `-32600`; server errors become
/// `-32603`.
async fn rewrite_failure(response: Response) -> Response {
    let status = response.status();
    let detail = match to_bytes(response.into_body(), MAX_FAILURE_BODY_BYTES).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_owned(),
        Err(err) => {
            debug!(%err, "failed to read transport failure body");
            String::new()
        }
    };

    if status == StatusCode::UNAUTHORIZED {
        return AppError::Session(detail).into_response();
    }
    if status.is_server_error() {
        error!(%status, %detail, "streamable transport failed");
        return error_response(status, INTERNAL_ERROR, "Internal error");
    }
    debug!(%status, %detail, "streamable request rejected");
    let message = if detail.is_empty() {
        status.canonical_reason().unwrap_or("Invalid Request").to_owned()
    } else {
        detail
    };
    error_response(status, INVALID_REQUEST, &message)
}
