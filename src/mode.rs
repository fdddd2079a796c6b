//! Server transport mode: which protocol surfaces the process exposes.
//!
//! `ServerMode` is used as the `--mode` CLI flag value. It determines which
//! transports the server initialises at startup.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Top-level transport mode for the server.
///
/// Passed as `--mode` on the command line. Defaults to [`ServerMode::Http`].
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMode {
    /// SSE and streamable HTTP transports plus `/render` on one listener. Default mode.
    #[default]
    Http,
    /// Legacy SSE transport plus `/render`.
    Sse,
    /// Streamable HTTP transport plus `/render`.
    Streamable,
    /// MCP over stdin/stdout; no HTTP listener.
    Stdio,
}

impl ServerMode {
    /// Whether the legacy SSE endpoints are mounted.
    #[must_use]
    pub fn serves_sse(self) -> bool {
        matches!(self, Self::Http | Self::Sse)
    }

    /// Whether the streamable HTTP endpoint is mounted.
    #[must_use]
    pub fn serves_streamable(self) -> bool {
        matches!(self, Self::Http | Self::Streamable)
    }

    /// Whether an HTTP listener is needed at all.
    #[must_use]
    pub fn uses_http(self) -> bool {
        !matches!(self, Self::Stdio)
    }
}
