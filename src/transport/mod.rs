//! Wire-level transports binding one HTTP client to one protocol server.
//!
//! The SSE transport owns the channel pair feeding its [`MermaidServer`]
//! instance; streamable sessions are served by rmcp. Both report their
//! lifecycle to a [`TransportObserver`] through explicit [`TransportEvent`]
//! values. The observer never receives a reference back into the
//! transport's internal state.
//!
//! [`MermaidServer`]: crate::mcp::handler::MermaidServer

pub mod jsonrpc;
pub mod sse;
pub mod streamable;

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::{Stream, StreamExt};
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::{ServerHandler, ServiceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Request/response header carrying the streamable session id.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Request header naming the last event a reconnecting client received.
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Lifecycle notification emitted by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The transport completed its handshake and owns this session id.
    Initialized(String),
    /// The transport closed; the session id will never be served again.
    Closed(String),
}

/// Receiver of transport lifecycle events.
///
/// Called synchronously from the transport; implementations must not call
/// back into the emitting transport's request handlers.
pub trait TransportObserver: Send + Sync {
    /// Handle one lifecycle event.
    fn on_event(&self, event: TransportEvent);
}

/// Behaviour shared by every transport flavour.
pub trait Transport: Send + Sync {
    /// Session id assigned to this transport, once initialized.
    fn session_id(&self) -> Option<String>;

    /// Handle to the protocol server connected to this transport.
    fn server_handle(&self) -> Option<ServerHandle>;

    /// Close the transport, ending its streams and detaching the server.
    ///
    /// Idempotent: only the first call emits [`TransportEvent::Closed`].
    fn close(&self);

    /// Whether [`Transport::close`] has run.
    fn is_closed(&self) -> bool;
}

/// Handle to a per-session protocol server task.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    ct: CancellationToken,
    closed: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Wrap the cancellation token driving a server task.
    #[must_use]
    pub fn new(ct: CancellationToken) -> Self {
        Self {
            ct,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop the server task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Mcp` if the handle was already closed.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(AppError::Mcp("protocol server already closed".into()));
        }
        self.ct.cancel();
        Ok(())
    }

    /// Whether the server was closed through this handle or cancelled.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.ct.is_cancelled()
    }
}

/// Server-side ends of the channel pair between a transport and its server.
pub(crate) struct ServerChannels {
    inbound: UnboundedReceiver<ClientJsonRpcMessage>,
    outbound: UnboundedSender<ServerJsonRpcMessage>,
}

/// Create the channel pair for one transport.
///
/// Returns the transport's sender for client messages, the transport's
/// receiver for server messages, and the ends handed to the server.
pub(crate) fn server_channels() -> (
    UnboundedSender<ClientJsonRpcMessage>,
    UnboundedReceiver<ServerJsonRpcMessage>,
    ServerChannels,
) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded();
    let (outbound_tx, outbound_rx) = mpsc::unbounded();
    (
        inbound_tx,
        outbound_rx,
        ServerChannels {
            inbound: inbound_rx,
            outbound: outbound_tx,
        },
    )
}

/// Run `server` over `channels` on a background task.
///
/// `on_exit` runs once the server stops for any reason.
pub(crate) fn spawn_server<S, F>(server: S, channels: ServerChannels, on_exit: F) -> ServerHandle
where
    S: ServerHandler,
    F: FnOnce() + Send + 'static,
{
    let ct = CancellationToken::new();
    let handle = ServerHandle::new(ct.clone());

    tokio::spawn(async move {
        match server
            .serve_with_ct((channels.outbound, channels.inbound), ct)
            .await
        {
            Ok(running) => match running.waiting().await {
                Ok(reason) => debug!(?reason, "protocol server stopped"),
                Err(err) => warn!(%err, "protocol server task failed"),
            },
            Err(err) => debug!(%err, "protocol server ended before initialization"),
        }
        on_exit();
    });

    handle
}

/// One server-sent event destined for a client stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name; `None` means the default `message` event.
    pub event: Option<String>,
    /// Event payload.
    pub data: String,
}

impl SseFrame {
    /// Default `message` event carrying `data`.
    #[must_use]
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }

    /// Named event carrying `data`.
    #[must_use]
    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
        }
    }

    fn into_event(self) -> Event {
        let mut event = Event::default().data(self.data);
        if let Some(name) = self.event {
            event = event.event(name);
        }
        event
    }
}

/// Stream wrapper running a callback when the client side goes away.
pub(crate) struct ClosingStream<S> {
    inner: S,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl<S> ClosingStream<S> {
    pub(crate) fn new(inner: S, on_drop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner,
            on_drop: Some(Box::new(on_drop)),
        }
    }
}

impl<S: Stream + Unpin> Stream for ClosingStream<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for ClosingStream<S> {
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

/// Build a keep-alive `text/event-stream` response from a frame stream.
pub(crate) fn sse_response<S>(frames: S) -> Response
where
    S: Stream<Item = SseFrame> + Send + 'static,
{
    let events = frames.map(|frame| Ok::<_, Infallible>(frame.into_event()));
    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Read a header as trimmed, non-empty text.
#[must_use]
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Whether the `Content-Type` header is JSON.
#[must_use]
pub fn is_json_content(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"))
}
