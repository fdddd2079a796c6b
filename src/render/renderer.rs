//! Diagram renderer backed by the Mermaid CLI.
//!
//! Each render writes the source into a private temporary directory and
//! invokes the CLI twice, once for SVG and once for PNG. The child process
//! is killed if the timeout elapses or the caller goes away.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use bytes::Bytes;
use tokio::process::Command;
use tracing::{debug, info_span, Instrument};

use super::RenderedDiagram;
use crate::config::RendererConfig;
use crate::{AppError, Result};

/// Turns Mermaid source into SVG markup and a PNG screenshot.
pub trait DiagramRenderer: Send + Sync {
    /// Render `source` with the given theme and background colour.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Render` if the renderer fails or times out.
    fn render<'a>(
        &'a self,
        source: &'a str,
        theme: &'a str,
        background: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RenderedDiagram>> + Send + 'a>>;
}

/// [`DiagramRenderer`] running the `mmdc` executable.
#[derive(Debug, Clone)]
pub struct MermaidCliRenderer {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl MermaidCliRenderer {
    /// Build a renderer from configuration.
    #[must_use]
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            timeout: config.timeout(),
        }
    }

    async fn run_cli(&self, input: &Path, output: &Path, theme: &str, background: &str) -> Result<()> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg("-i")
            .arg(input)
            .arg("-o")
            .arg(output)
            .arg("-t")
            .arg(theme)
            .arg("-b")
            .arg(background)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|err| {
            AppError::Render(format!("failed to spawn renderer '{}': {err}", self.command))
        })?;

        let output_result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AppError::Render(format!(
                    "renderer timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|err| AppError::Render(format!("renderer did not complete: {err}")))?;

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr);
            return Err(AppError::Render(format!(
                "renderer exited with {}: {}",
                output_result.status,
                stderr.trim()
            )));
        }

        debug!(output = %output.display(), "renderer finished");
        Ok(())
    }

    async fn render_all(&self, source: &str, theme: &str, background: &str) -> Result<RenderedDiagram> {
        let workdir = tempfile::tempdir()
            .map_err(|err| AppError::Io(format!("failed to create render directory: {err}")))?;
        let input = workdir.path().join("diagram.mmd");
        let svg_path = workdir.path().join("diagram.svg");
        let png_path = workdir.path().join("diagram.png");

        tokio::fs::write(&input, source).await?;

        self.run_cli(&input, &svg_path, theme, background).await?;
        self.run_cli(&input, &png_path, theme, background).await?;

        let svg = tokio::fs::read_to_string(&svg_path)
            .await
            .map_err(|err| AppError::Render(format!("renderer produced no svg: {err}")))?;
        let screenshot = tokio::fs::read(&png_path)
            .await
            .map_err(|err| AppError::Render(format!("renderer produced no png: {err}")))?;

        Ok(RenderedDiagram {
            svg,
            screenshot: Bytes::from(screenshot),
        })
    }
}

impl DiagramRenderer for MermaidCliRenderer {
    fn render<'a>(
        &'a self,
        source: &'a str,
        theme: &'a str,
        background: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RenderedDiagram>> + Send + 'a>> {
        let span = info_span!("render_diagram", theme, background);
        Box::pin(self.render_all(source, theme, background).instrument(span))
    }
}
