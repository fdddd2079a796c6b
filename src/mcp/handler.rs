//! MCP tool server exposing Mermaid rendering.

use std::future::Future;
use std::sync::Arc;

use base64::Engine;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, LoggingLevel, LoggingMessageNotificationParam, ServerCapabilities,
    ServerInfo,
};
use rmcp::service::NotificationContext;
use rmcp::{tool, tool_handler, tool_router, ErrorData, RoleServer, ServerHandler};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::render::renderer::DiagramRenderer;
use crate::render::{OutputType, RenderRequest};
use crate::AppError;

/// Logger name on protocol log notifications.
pub const LOGGER_NAME: &str = "mermaid-mcp";

/// Arguments of the `render_mermaid` tool.
///
/// Field names match the `/render` body: `backgroundColor`, `outputType`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenderMermaidParams {
    /// Mermaid diagram source.
    pub mermaid: String,
    /// Mermaid theme (`default`, `dark`, `forest`, `neutral`). Defaults to `default`.
    pub theme: Option<String>,
    /// Background colour, e.g. `white`, `transparent` or `#f0f0f0`. Defaults to `white`.
    pub background_color: Option<String>,
    /// `png` (default) returns an image, `svg` returns markup, `mermaid` echoes the source.
    pub output_type: Option<OutputType>,
}

/// Per-session protocol server.
///
/// Cheap to clone; every session gets its own instance sharing the renderer.
#[derive(Clone)]
pub struct MermaidServer {
    renderer: Arc<dyn DiagramRenderer>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MermaidServer {
    /// Create a server rendering through `renderer`.
    #[must_use]
    pub fn new(renderer: Arc<dyn DiagramRenderer>) -> Self {
        Self {
            renderer,
            tool_router: Self::tool_router(),
        }
    }

    /// Render a Mermaid diagram to PNG (image content), SVG (text), or
    /// validate it and echo the source back.
    #[tool(name = "render_mermaid")]
    async fn render_mermaid(
        &self,
        params: Parameters<RenderMermaidParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let RenderMermaidParams { mermaid, theme, background_color, output_type } = params.0;

        let request = RenderRequest::new(mermaid, theme, background_color, output_type)
            .map_err(|err| ErrorData::invalid_params(err.to_string(), None))?;

        let span = info_span!(
            "render_mermaid_tool",
            output_type = %request.output_type,
            theme = %request.theme
        );
        let rendered = self
            .renderer
            .render(&request.mermaid, &request.theme, &request.background_color)
            .instrument(span)
            .await
            .map_err(|err| {
                warn!(%err, "render_mermaid tool failed");
                tool_error(&err)
            })?;

        let content = match request.output_type {
            OutputType::Mermaid => Content::text(request.mermaid),
            OutputType::Svg => Content::text(rendered.svg),
            OutputType::Png => {
                if rendered.screenshot.is_empty() {
                    return Err(ErrorData::internal_error(
                        "renderer returned an empty screenshot",
                        None,
                    ));
                }
                let encoded =
                    base64::engine::general_purpose::STANDARD.encode(&rendered.screenshot);
                Content::image(encoded, OutputType::Png.mime_type())
            }
        };

        info!(output_type = %request.output_type, "diagram rendered");
        Ok(CallToolResult::success(vec![content]))
    }
}

fn tool_error(err: &AppError) -> ErrorData {
    match err {
        AppError::Validation(msg) => ErrorData::invalid_params(msg.clone(), None),
        _ => ErrorData::internal_error("failed to render diagram", None),
    }
}

#[tool_handler]
impl ServerHandler for MermaidServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Mermaid diagram rendering server (tools: render_mermaid). Pass diagram \
                 source in `mermaid`; choose `output_type` png, svg or mermaid."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_logging()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }

    /// Announce readiness with a log notification once the handshake ends.
    ///
    /// Streamable clients receive it on the standalone stream, where it is
    /// retained for `Last-Event-ID` replay.
    fn on_initialized(
        &self,
        context: NotificationContext<RoleServer>,
    ) -> impl Future<Output = ()> + Send + '_ {
        async move {
            let ready = LoggingMessageNotificationParam {
                level: LoggingLevel::Info,
                logger: Some(LOGGER_NAME.into()),
                data: json!("session ready"),
            };
            if let Err(err) = context.peer.notify_logging_message(ready).await {
                debug!(%err, "could not announce session readiness");
            }
        }
    }
}
