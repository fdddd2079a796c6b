//! Diagram rendering: request model, renderer and storage collaborators,
//! and the REST orchestrator tying them together.

pub mod orchestrator;
pub mod renderer;
pub mod storage;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use bytes::Bytes;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AppError, Result};

/// Theme used when the request names none.
pub const DEFAULT_THEME: &str = "default";

/// Background colour used when the request names none.
pub const DEFAULT_BACKGROUND: &str = "white";

/// Artifact produced for a render request.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    /// Rasterised diagram uploaded to file storage. Default.
    #[default]
    Png,
    /// SVG markup returned inline.
    Svg,
    /// The diagram source echoed back after a successful render.
    Mermaid,
}

impl OutputType {
    /// MIME type of the artifact.
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Svg => "image/svg+xml",
            Self::Mermaid => "text/plain",
        }
    }

    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
            Self::Mermaid => "mermaid",
        }
    }
}

impl Display for OutputType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "png" => Ok(Self::Png),
            "svg" => Ok(Self::Svg),
            "mermaid" => Ok(Self::Mermaid),
            other => Err(AppError::Validation(format!(
                "outputType must be one of png, svg, mermaid; got '{other}'"
            ))),
        }
    }
}

/// Validated render input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    /// Diagram source, non-empty after trimming.
    pub mermaid: String,
    /// Mermaid theme name.
    pub theme: String,
    /// Background colour understood by the renderer.
    pub background_color: String,
    /// Requested artifact.
    pub output_type: OutputType,
}

impl RenderRequest {
    /// Build a request, applying defaults for absent options.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if `mermaid` is blank, an option
    /// looks like a command-line flag, or `theme` is not a plain name.
    pub fn new(
        mermaid: impl Into<String>,
        theme: Option<String>,
        background_color: Option<String>,
        output_type: Option<OutputType>,
    ) -> Result<Self> {
        let mermaid = mermaid.into();
        if mermaid.trim().is_empty() {
            return Err(AppError::Validation(
                "mermaid must be a non-empty string".into(),
            ));
        }

        let theme = option_or(theme, DEFAULT_THEME, "theme")?;
        if !is_theme_name(&theme) {
            return Err(AppError::Validation(
                "theme may only contain letters, digits, '_' and '-'".into(),
            ));
        }
        let background_color = option_or(background_color, DEFAULT_BACKGROUND, "backgroundColor")?;

        Ok(Self {
            mermaid,
            theme,
            background_color,
            output_type: output_type.unwrap_or_default(),
        })
    }

    /// Parse a REST request body.
    ///
    /// Accepts `{mermaid, theme?, backgroundColor?, outputType?}`. JSON
    /// `null` counts as absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the body is not an object, a field
    /// has the wrong type, or `outputType` is unrecognised.
    pub fn from_value(body: &Value) -> Result<Self> {
        let object = body
            .as_object()
            .ok_or_else(|| AppError::Validation("request body must be a JSON object".into()))?;

        let mermaid = match object.get("mermaid") {
            Some(Value::String(source)) => source.clone(),
            None | Some(Value::Null) => {
                return Err(AppError::Validation("mermaid is required".into()))
            }
            Some(_) => {
                return Err(AppError::Validation("mermaid must be a string".into()));
            }
        };

        let theme = optional_string(object.get("theme"), "theme")?;
        let background_color = optional_string(object.get("backgroundColor"), "backgroundColor")?;
        let output_type = optional_string(object.get("outputType"), "outputType")?
            .map(|value| value.parse::<OutputType>())
            .transpose()?;

        Self::new(mermaid, theme, background_color, output_type)
    }
}

fn optional_string(value: Option<&Value>, field: &str) -> Result<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(AppError::Validation(format!("{field} must be a string"))),
    }
}

fn option_or(value: Option<String>, default: &str, field: &str) -> Result<String> {
    let value = value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_owned());
    // Values are handed to the renderer as separate argv entries.
    if value.starts_with('-') {
        return Err(AppError::Validation(format!(
            "{field} must not start with '-'"
        )));
    }
    Ok(value)
}

/// Whether `theme` is a bare name: ASCII letters, digits, `_` and `-`.
#[must_use]
pub fn is_theme_name(theme: &str) -> bool {
    !theme.is_empty()
        && theme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Renderer output for one diagram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedDiagram {
    /// SVG markup.
    pub svg: String,
    /// PNG bytes; empty when the renderer produced no raster image.
    pub screenshot: Bytes,
}

/// Stored file returned by [`storage::FileStorage::upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArtifact {
    /// Storage-assigned identifier.
    pub file_id: String,
    /// Public download URL.
    pub url: String,
    /// MIME type recorded with the upload.
    pub mime_type: String,
}

/// Success body of `POST /render`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResponse {
    /// Download URL (`png`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Storage id (`png`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    /// Inline markup (`svg`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub svg: Option<String>,
    /// Echoed source (`mermaid`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mermaid: Option<String>,
    /// MIME type of the artifact.
    pub mime_type: String,
}

impl RenderResponse {
    /// Response for an uploaded PNG.
    #[must_use]
    pub fn uploaded(artifact: FileArtifact) -> Self {
        Self {
            url: Some(artifact.url),
            file_id: Some(artifact.file_id),
            svg: None,
            mermaid: None,
            mime_type: artifact.mime_type,
        }
    }

    /// Response carrying SVG markup.
    #[must_use]
    pub fn svg(svg: String) -> Self {
        Self {
            url: None,
            file_id: None,
            svg: Some(svg),
            mermaid: None,
            mime_type: OutputType::Svg.mime_type().to_owned(),
        }
    }

    /// Response echoing the diagram source.
    #[must_use]
    pub fn mermaid(source: String) -> Self {
        Self {
            url: None,
            file_id: None,
            svg: None,
            mermaid: Some(source),
            mime_type: OutputType::Mermaid.mime_type().to_owned(),
        }
    }
}
