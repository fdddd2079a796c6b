//! Pure classification of inbound requests.

use axum::http::Method;

use crate::config::{EndpointConfig, HEALTH_PATH, RENDER_PATH};
use crate::mode::ServerMode;

/// Handler an inbound request is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `GET <sse_path>`
    SseConnect,
    /// `POST <message_path>[?sessionId=...]`
    SseMessage,
    /// `POST <streamable_path>`
    StreamablePost,
    /// `GET <streamable_path>`
    StreamableGet,
    /// `DELETE <streamable_path>`
    StreamableDelete,
    /// `POST /render`
    Render,
    /// `GET /health`
    Health,
    /// Anything else.
    Unmatched,
}

/// Endpoint paths active for one server mode.
///
/// A disabled transport has no path and never matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    sse_path: Option<String>,
    message_path: Option<String>,
    streamable_path: Option<String>,
}

impl Endpoints {
    /// Select the paths served in `mode`.
    #[must_use]
    pub fn for_mode(config: &EndpointConfig, mode: ServerMode) -> Self {
        let sse = mode.serves_sse();
        let streamable = mode.serves_streamable();
        Self {
            sse_path: sse.then(|| config.sse_path.clone()),
            message_path: sse.then(|| config.message_path.clone()),
            streamable_path: streamable.then(|| config.streamable_path.clone()),
        }
    }

    /// Message path advertised to SSE clients, when SSE is enabled.
    #[must_use]
    pub fn message_path(&self) -> Option<&str> {
        self.message_path.as_deref()
    }

    /// Classify a request by method and path.
    #[must_use]
    pub fn classify(&self, method: &Method, path: &str) -> Route {
        if self.streamable_path.as_deref() == Some(path) {
            return match *method {
                Method::POST => Route::StreamablePost,
                Method::GET => Route::StreamableGet,
                Method::DELETE => Route::StreamableDelete,
                _ => Route::Unmatched,
            };
        }
        if self.sse_path.as_deref() == Some(path) && method == Method::GET {
            return Route::SseConnect;
        }
        if method == Method::POST
            && self
                .message_path
                .as_deref()
                .is_some_and(|prefix| path.starts_with(prefix))
        {
            return Route::SseMessage;
        }
        if path == RENDER_PATH && method == Method::POST {
            return Route::Render;
        }
        if path == HEALTH_PATH && method == Method::GET {
            return Route::Health;
        }
        Route::Unmatched
    }
}
