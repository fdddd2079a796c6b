//! Protocol sessions: the registry of live sessions and the controller
//! that creates, resolves, and tears them down.

pub mod controller;
pub mod manager;
pub mod registry;

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transport::sse::SseTransport;
use crate::transport::streamable::StreamableSession;
use crate::transport::{ServerHandle, Transport};

/// Wire style a session was opened with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Legacy `GET /sse` + `POST /messages` session.
    Sse,
    /// Streamable HTTP session keyed by `mcp-session-id`.
    Streamable,
}

impl Display for SessionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sse => f.write_str("sse"),
            Self::Streamable => f.write_str("streamable"),
        }
    }
}

/// Transport owned by a session.
#[derive(Clone)]
pub enum SessionTransport {
    /// Streamable HTTP session served by rmcp.
    Streamable(Arc<StreamableSession>),
    /// Legacy SSE transport.
    Sse(Arc<SseTransport>),
}

impl SessionTransport {
    /// Wire style of the transport.
    #[must_use]
    pub fn mode(&self) -> SessionMode {
        match self {
            Self::Streamable(_) => SessionMode::Streamable,
            Self::Sse(_) => SessionMode::Sse,
        }
    }

    /// Close the underlying transport.
    pub fn close(&self) {
        self.as_transport().close();
    }

    /// Whether the underlying transport has closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.as_transport().is_closed()
    }

    fn as_transport(&self) -> &dyn Transport {
        match self {
            Self::Streamable(transport) => transport.as_ref(),
            Self::Sse(transport) => transport.as_ref(),
        }
    }
}

impl From<Arc<StreamableSession>> for SessionTransport {
    fn from(transport: Arc<StreamableSession>) -> Self {
        Self::Streamable(transport)
    }
}

impl From<Arc<SseTransport>> for SessionTransport {
    fn from(transport: Arc<SseTransport>) -> Self {
        Self::Sse(transport)
    }
}

/// One live client conversation.
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    transport: SessionTransport,
    server: ServerHandle,
}

impl Session {
    /// Bind `transport` and its connected `server` under `id`.
    #[must_use]
    pub fn new(id: String, transport: SessionTransport, server: ServerHandle) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            transport,
            server,
        }
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wire style.
    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.transport.mode()
    }

    /// When the session was registered.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Owning transport.
    #[must_use]
    pub fn transport(&self) -> &SessionTransport {
        &self.transport
    }

    /// Protocol server connected to the transport.
    #[must_use]
    pub fn server(&self) -> &ServerHandle {
        &self.server
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("mode", &self.mode())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
