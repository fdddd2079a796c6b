#![forbid(unsafe_code)]

//! `mermaid-mcp`: Mermaid rendering MCP server binary.
//!
//! Bootstraps configuration and serves the tool server either over HTTP
//! (SSE and streamable transports plus `/render`) or over stdio.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use mermaid_mcp::config::GlobalConfig;
use mermaid_mcp::http::server::{serve_http, HttpState};
use mermaid_mcp::mcp::handler::MermaidServer;
use mermaid_mcp::mcp::transport;
use mermaid_mcp::mode::ServerMode;
use mermaid_mcp::render::renderer::{DiagramRenderer, MermaidCliRenderer};
use mermaid_mcp::render::storage::{DisabledStorage, FileStorage, HttpFileStorage};
use mermaid_mcp::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "mermaid-mcp", about = "Mermaid diagram MCP server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Transport surface to expose.
    #[arg(long, value_enum, default_value_t = ServerMode::Http)]
    mode: ServerMode,

    /// Override the configured HTTP port.
    #[arg(long)]
    port: Option<u16>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!(mode = ?args.mode, "mermaid-mcp server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(port) = args.port {
        config.port = port;
    }
    info!("configuration loaded");

    let renderer: Arc<dyn DiagramRenderer> = Arc::new(MermaidCliRenderer::new(&config.renderer));
    let ct = CancellationToken::new();

    let server_handle = if args.mode.uses_http() {
        let storage: Arc<dyn FileStorage> = match &config.storage.upload_url {
            Some(url) => Arc::new(HttpFileStorage::new(url.clone())),
            None => {
                info!("storage.upload_url not set; png uploads disabled");
                Arc::new(DisabledStorage)
            }
        };
        let listener = TcpListener::bind(config.bind_addr()).await.map_err(|err| {
            AppError::Config(format!("failed to bind {}: {err}", config.bind_addr()))
        })?;
        let state = HttpState::new(&config, args.mode, renderer, storage);

        let http_ct = ct.clone();
        tokio::spawn(async move {
            if let Err(err) = serve_http(listener, state, http_ct).await {
                error!(%err, "http transport failed");
            }
        })
    } else {
        let stdio_ct = ct.clone();
        let server = MermaidServer::new(renderer);
        tokio::spawn(async move {
            if let Err(err) = transport::serve_stdio(server, stdio_ct).await {
                error!(%err, "stdio transport failed");
            }
        })
    };

    info!("MCP server ready");

    let mut server_handle = server_handle;
    tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            ct.cancel();
            let _ = server_handle.await;
        }
        _ = &mut server_handle => {
            info!("transport finished");
        }
    }

    info!("mermaid-mcp shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries protocol frames in stdio mode.
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
