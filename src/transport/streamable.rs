//! Streamable HTTP sessions served by rmcp's [`StreamableHttpService`].
//!
//! rmcp owns the wire protocol: SSE framing, per-request streams, event ids
//! and the replay cache. This module holds what the registry needs on top of
//! that: one [`StreamableSession`] per rmcp session, reporting its lifecycle
//! through [`TransportEvent`]s and tracking the JSON-RPC request ids that are
//! still awaiting a response.
//!
//! [`StreamableHttpService`]: rmcp::transport::streamable_http_server::StreamableHttpService

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ServerHandle, Transport, TransportEvent, TransportObserver};
use crate::config::GlobalConfig;

/// Reconnect interval advertised in priming events.
pub const SSE_RETRY: Duration = Duration::from_secs(3);

/// Interval between keep-alive comments on open streams.
pub const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Streamable transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamableOptions {
    /// Retry interval sent in priming events; `None` disables priming.
    pub sse_retry: Option<Duration>,
    /// Events retained per stream for `Last-Event-ID` replay.
    pub events_per_stream: usize,
}

impl StreamableOptions {
    /// Derive the transport settings from configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            sse_retry: config.enable_resumability.then_some(SSE_RETRY),
            events_per_stream: config.max_events_per_stream,
        }
    }
}

/// Whether `value` has the shape of a stream event id: `<index>` on the
/// standalone stream, `<index>/<request>` on a request stream.
#[must_use]
pub fn is_event_id(value: &str) -> bool {
    let (index, request) = match value.split_once('/') {
        Some((index, request)) => (index, Some(request)),
        None => (value, None),
    };
    index.parse::<usize>().is_ok() && request.is_none_or(|request| request.parse::<u64>().is_ok())
}

/// Registry-facing handle on one rmcp streamable session.
pub struct StreamableSession {
    session_id: String,
    observer: Arc<dyn TransportObserver>,
    server: ServerHandle,
    shutdown: CancellationToken,
    initialized: AtomicBool,
    closed: AtomicBool,
    in_flight: Mutex<HashSet<String>>,
}

impl StreamableSession {
    /// Create a session reporting to `observer`.
    ///
    /// Cancelling [`StreamableSession::shutdown_token`] asks the owner to tear
    /// the rmcp session down.
    #[must_use]
    pub fn new(session_id: impl Into<String>, observer: Arc<dyn TransportObserver>) -> Arc<Self> {
        let shutdown = CancellationToken::new();
        Arc::new(Self {
            session_id: session_id.into(),
            observer,
            server: ServerHandle::new(shutdown.clone()),
            shutdown,
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    /// Session id shared with rmcp and the `mcp-session-id` header.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.session_id
    }

    /// Token cancelled once the session should stop.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Record a completed `initialize` handshake.
    ///
    /// Emits [`TransportEvent::Initialized`] on the first call only.
    pub fn mark_initialized(&self) {
        if self.is_closed() || self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(session_id = %self.session_id, "streamable session initialized");
        self.observer
            .on_event(TransportEvent::Initialized(self.session_id.clone()));
    }

    /// Claim `key` (a serialized JSON-RPC request id) for one in-flight request.
    ///
    /// Returns `None` while another request with the same id is still
    /// awaiting its response. The claim is released when the returned guard
    /// drops.
    #[must_use]
    pub fn begin_request(self: &Arc<Self>, key: String) -> Option<InFlightRequest> {
        if !self.lock_in_flight().insert(key.clone()) {
            debug!(session_id = %self.session_id, request_id = %key, "request id already in flight");
            return None;
        }
        Some(InFlightRequest {
            session: Arc::clone(self),
            key,
        })
    }

    /// Number of requests still awaiting a response.
    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.lock_in_flight().len()
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for StreamableSession {
    fn session_id(&self) -> Option<String> {
        Some(self.session_id.clone())
    }

    fn server_handle(&self) -> Option<ServerHandle> {
        Some(self.server.clone())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.initialized.load(Ordering::SeqCst) {
            info!(session_id = %self.session_id, "streamable session closed");
            self.observer
                .on_event(TransportEvent::Closed(self.session_id.clone()));
        }
        self.shutdown.cancel();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for StreamableSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Claim on a JSON-RPC request id, released on drop.
pub struct InFlightRequest {
    session: Arc<StreamableSession>,
    key: String,
}

impl Drop for InFlightRequest {
    fn drop(&mut self) {
        self.session.lock_in_flight().remove(&self.key);
    }
}
