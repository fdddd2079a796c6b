//! `POST /render` pipeline: authenticate, validate, render, deliver.

use std::sync::Arc;

use axum::http::{header, HeaderMap};
use chrono::Utc;
use serde_json::Value;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use super::renderer::DiagramRenderer;
use super::storage::FileStorage;
use super::{OutputType, RenderRequest, RenderResponse};
use crate::{AppError, Result};

/// Message returned for a missing or malformed credential.
pub const UNAUTHORIZED_MESSAGE: &str = "Missing or invalid Authorization header";

/// Coordinates the renderer and file storage for REST callers.
#[derive(Clone)]
pub struct RenderOrchestrator {
    renderer: Arc<dyn DiagramRenderer>,
    storage: Arc<dyn FileStorage>,
}

impl RenderOrchestrator {
    /// Create an orchestrator over the given collaborators.
    #[must_use]
    pub fn new(renderer: Arc<dyn DiagramRenderer>, storage: Arc<dyn FileStorage>) -> Self {
        Self { renderer, storage }
    }

    /// Handle one render request.
    ///
    /// The bearer token is checked before the body is looked at.
    ///
    /// # Errors
    ///
    /// * `AppError::Unauthorized` when the `Authorization` header is missing
    ///   or not a bearer credential.
    /// * `AppError::Validation` when the body is malformed.
    /// * `AppError::Render` or `AppError::Storage` when a collaborator fails.
    pub async fn handle(&self, headers: &HeaderMap, body: &[u8]) -> Result<RenderResponse> {
        let token = bearer_token(headers)
            .ok_or_else(|| AppError::Unauthorized(UNAUTHORIZED_MESSAGE.into()))?;

        let body: Value = serde_json::from_slice(body)
            .map_err(|err| AppError::Validation(format!("request body is not valid JSON: {err}")))?;
        let request = RenderRequest::from_value(&body)?;

        let span = info_span!(
            "render_request",
            output_type = %request.output_type,
            theme = %request.theme
        );
        self.execute(request, token).instrument(span).await
    }

    async fn execute(&self, request: RenderRequest, token: &str) -> Result<RenderResponse> {
        let rendered = self
            .renderer
            .render(&request.mermaid, &request.theme, &request.background_color)
            .await?;

        match request.output_type {
            OutputType::Mermaid => Ok(RenderResponse::mermaid(request.mermaid)),
            OutputType::Svg => Ok(RenderResponse::svg(rendered.svg)),
            OutputType::Png => {
                if rendered.screenshot.is_empty() {
                    return Err(AppError::Render("renderer returned an empty screenshot".into()));
                }
                let file_name = png_file_name(&request.theme);
                let artifact = self
                    .storage
                    .upload(
                        rendered.screenshot,
                        &file_name,
                        OutputType::Png.mime_type(),
                        token,
                    )
                    .await?;
                info!(file_id = %artifact.file_id, file_name = %file_name, "diagram uploaded");
                Ok(RenderResponse::uploaded(artifact))
            }
        }
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// `mermaid-<theme>-<yyyyMMddHHmmssSSS>-<8 hex>.png`
///
/// Characters outside `[A-Za-z0-9_-]` in `theme` become `_`.
#[must_use]
pub fn png_file_name(theme: &str) -> String {
    let theme: String = theme
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let timestamp = Utc::now().format("%Y%m%d%H%M%S%3f");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("mermaid-{theme}-{timestamp}-{}.png", &suffix[..8])
}
