//! Global configuration parsing, validation, and environment overrides.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::{AppError, Result};

/// Path of the REST render endpoint. Not configurable.
pub const RENDER_PATH: &str = "/render";

/// Path of the liveness endpoint. Not configurable.
pub const HEALTH_PATH: &str = "/health";

/// Environment variable overriding `storage.upload_url`.
pub const STORAGE_URL_ENV: &str = "MERMAID_MCP_STORAGE_URL";

/// HTTP paths served by the protocol transports.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EndpointConfig {
    /// `GET` path opening a legacy SSE session.
    #[serde(default = "default_sse_path")]
    pub sse_path: String,
    /// `POST` path prefix for messages sent to an SSE session.
    #[serde(default = "default_message_path")]
    pub message_path: String,
    /// Path serving the streamable HTTP transport (`POST`, `GET`, `DELETE`).
    #[serde(default = "default_streamable_path")]
    pub streamable_path: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            sse_path: default_sse_path(),
            message_path: default_message_path(),
            streamable_path: default_streamable_path(),
        }
    }
}

/// Mermaid CLI invocation settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RendererConfig {
    /// Renderer executable, resolved through `PATH` when not absolute.
    #[serde(default = "default_renderer_command")]
    pub command: String,
    /// Extra arguments placed before the generated input/output flags.
    #[serde(default)]
    pub args: Vec<String>,
    /// Upper bound for a single renderer invocation.
    #[serde(default = "default_renderer_timeout")]
    pub timeout_seconds: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            command: default_renderer_command(),
            args: Vec::new(),
            timeout_seconds: default_renderer_timeout(),
        }
    }
}

impl RendererConfig {
    /// Renderer timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Remote file storage settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StorageConfig {
    /// Multipart upload endpoint. PNG output is unavailable when unset.
    #[serde(default)]
    pub upload_url: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_max_events_per_stream() -> usize {
    64
}

fn default_sse_path() -> String {
    "/sse".into()
}

fn default_message_path() -> String {
    "/messages".into()
}

fn default_streamable_path() -> String {
    "/mcp".into()
}

fn default_renderer_command() -> String {
    "mmdc".into()
}

fn default_renderer_timeout() -> u64 {
    60
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Interface the HTTP listener binds to.
    #[serde(default = "default_host")]
    pub host: String,
    /// HTTP listener port; `0` picks an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Open streamable event streams with a priming event advertising a
    /// reconnect interval, so clients resume with `Last-Event-ID`.
    #[serde(default = "default_true")]
    pub enable_resumability: bool,
    /// Events retained per streamable stream for replay; also the capacity
    /// of each stream's send buffer.
    #[serde(default = "default_max_events_per_stream")]
    pub max_events_per_stream: usize,
    /// Protocol endpoint paths.
    #[serde(default)]
    pub endpoints: EndpointConfig,
    /// Mermaid CLI settings.
    #[serde(default)]
    pub renderer: RendererConfig,
    /// File storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_resumability: true,
            max_events_per_stream: default_max_events_per_stream(),
            endpoints: EndpointConfig::default(),
            renderer: RendererConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from environment variables.
    ///
    /// Only `MERMAID_MCP_STORAGE_URL` is recognised; empty values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var(STORAGE_URL_ENV) {
            if !url.trim().is_empty() {
                info!(var = STORAGE_URL_ENV, "storage upload url overridden from environment");
                self.storage.upload_url = Some(url.trim().to_owned());
            }
        }
    }

    /// `host:port` string suitable for binding a listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate endpoint layout and numeric bounds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        let paths = [
            ("endpoints.sse_path", &self.endpoints.sse_path),
            ("endpoints.message_path", &self.endpoints.message_path),
            ("endpoints.streamable_path", &self.endpoints.streamable_path),
        ];

        for (name, path) in paths {
            if !path.starts_with('/') || path.len() < 2 {
                return Err(AppError::Config(format!(
                    "{name} must be an absolute path, got '{path}'"
                )));
            }
            if path == RENDER_PATH || path == HEALTH_PATH {
                return Err(AppError::Config(format!(
                    "{name} collides with reserved path '{path}'"
                )));
            }
        }

        for (index, (name, path)) in paths.iter().enumerate() {
            if let Some((other, _)) = paths[index + 1..].iter().find(|(_, p)| p == path) {
                return Err(AppError::Config(format!(
                    "{name} and {other} must differ, both are '{path}'"
                )));
            }
        }

        if self.renderer.command.trim().is_empty() {
            return Err(AppError::Config("renderer.command must not be empty".into()));
        }

        if self.renderer.timeout_seconds == 0 {
            return Err(AppError::Config(
                "renderer.timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.max_events_per_stream == 0 {
            return Err(AppError::Config(
                "max_events_per_stream must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
