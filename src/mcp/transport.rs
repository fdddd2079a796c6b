//! Stdio transport setup.
//!
//! Wires a single [`MermaidServer`] to stdin/stdout for clients that launch
//! the binary directly. Logging goes to stderr, so stdout carries only
//! protocol frames.

use rmcp::service::ServiceExt;
use rmcp::transport::io::stdio;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::handler::MermaidServer;
use crate::{AppError, Result};

/// Serve `server` over stdio until the client disconnects or `ct` fires.
///
/// # Errors
///
/// Returns `AppError::Mcp` if the transport fails to initialize or the
/// service task fails.
pub async fn serve_stdio(server: MermaidServer, ct: CancellationToken) -> Result<()> {
    let transport = stdio();

    info!("starting stdio MCP transport");
    let service = server
        .serve_with_ct(transport, ct)
        .await
        .map_err(|err| AppError::Mcp(format!("stdio transport failed: {err}")))?;

    service
        .waiting()
        .await
        .map_err(|err| AppError::Mcp(format!("stdio service error: {err}")))?;

    info!("stdio MCP transport shut down");
    Ok(())
}
