//! HTTP listener multiplexing the protocol transports and `/render`.
//!
//! Every request goes through one fallback handler which classifies it with
//! [`Endpoints::classify`] and dispatches to the session controller or the
//! render orchestrator.

use std::sync::Arc;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use super::response::{error_body, not_found, panic_response};
use super::route::{Endpoints, Route};
use crate::config::GlobalConfig;
use crate::mcp::handler::MermaidServer;
use crate::mode::ServerMode;
use crate::render::orchestrator::RenderOrchestrator;
use crate::render::renderer::DiagramRenderer;
use crate::render::storage::FileStorage;
use crate::session::controller::SessionController;
use crate::session::registry::SessionRegistry;
use crate::transport::jsonrpc::{error_response, INVALID_REQUEST};
use crate::transport::streamable::StreamableOptions;
use crate::transport::SESSION_ID_HEADER;
use crate::{AppError, Result};

/// Largest request body accepted on any route.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// State shared by every request.
#[derive(Clone)]
pub struct HttpState {
    /// Protocol session controller.
    pub controller: SessionController,
    /// `/render` pipeline.
    pub orchestrator: RenderOrchestrator,
    /// Paths active in the selected mode.
    pub endpoints: Arc<Endpoints>,
}

impl HttpState {
    /// Assemble state for `mode` from configuration and collaborators.
    #[must_use]
    pub fn new(
        config: &GlobalConfig,
        mode: ServerMode,
        renderer: Arc<dyn DiagramRenderer>,
        storage: Arc<dyn FileStorage>,
    ) -> Self {
        let controller = SessionController::new(
            SessionRegistry::new(),
            MermaidServer::new(Arc::clone(&renderer)),
            &StreamableOptions::from_config(config),
            config.endpoints.message_path.clone(),
        );

        Self {
            controller,
            orchestrator: RenderOrchestrator::new(renderer, storage),
            endpoints: Arc::new(Endpoints::for_mode(&config.endpoints, mode)),
        }
    }
}

/// Build the application router.
pub fn build_router(state: HttpState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(SESSION_ID_HEADER)]);

    Router::new()
        .fallback(dispatch)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn dispatch(State(state): State<HttpState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let route = state.endpoints.classify(&parts.method, parts.uri.path());
    debug!(?route, method = %parts.method, path = parts.uri.path(), "dispatching request");

    match route {
        Route::Health => "ok".into_response(),
        Route::Unmatched => not_found(),
        Route::SseConnect => state.controller.open_sse_session(),
        Route::SseMessage => match read_protocol_body(body).await {
            Ok(body) => {
                state
                    .controller
                    .handle_sse_message(parts.uri.query(), &parts.headers, &body)
            }
            Err(response) => response,
        },
        Route::StreamablePost => match read_protocol_body(body).await {
            Ok(body) => state.controller.handle_streamable_post(parts, body).await,
            Err(response) => response,
        },
        Route::StreamableGet => state.controller.handle_streamable_get(parts).await,
        Route::StreamableDelete => state.controller.handle_streamable_delete(parts).await,
        Route::Render => match read_body(body).await {
            Ok(body) => match state.orchestrator.handle(&parts.headers, &body).await {
                Ok(rendered) => Json(rendered).into_response(),
                Err(err) => err.into_response(),
            },
            Err(response) => response,
        },
    }
}

async fn read_body(body: Body) -> std::result::Result<Bytes, Response> {
    to_bytes(body, MAX_BODY_BYTES).await.map_err(|err| {
        debug!(%err, "failed to read request body");
        error_body(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
    })
}

async fn read_protocol_body(body: Body) -> std::result::Result<Bytes, Response> {
    to_bytes(body, MAX_BODY_BYTES).await.map_err(|err| {
        debug!(%err, "failed to read protocol request body");
        error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            INVALID_REQUEST,
            "Request body too large",
        )
    })
}

/// Serve `state` on `listener` until `ct` is cancelled.
///
/// On cancellation every live session is closed before the listener drains,
/// so open event streams end and graceful shutdown can complete.
///
/// # Errors
///
/// Returns `AppError::Transport` if the server fails.
pub async fn serve_http(
    listener: TcpListener,
    state: HttpState,
    ct: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    let controller = state.controller.clone();
    let sweep = controller.clone();

    info!(%addr, "starting HTTP transport");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            ct.cancelled().await;
            sweep.cleanup();
        })
        .await
        .map_err(|err| AppError::Transport(format!("HTTP server error: {err}")))?;

    controller.cleanup();
    info!("HTTP transport shut down");
    Ok(())
}
