//! Shared test helpers for HTTP-level integration tests.
//!
//! Provides fake render collaborators, a minimal configuration, and a
//! server bound to an ephemeral port so individual test modules can
//! focus on behaviour rather than boilerplate.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use mermaid_mcp::config::GlobalConfig;
use mermaid_mcp::http::server::{serve_http, HttpState};
use mermaid_mcp::mode::ServerMode;
use mermaid_mcp::render::renderer::DiagramRenderer;
use mermaid_mcp::render::storage::FileStorage;
use mermaid_mcp::render::{FileArtifact, RenderedDiagram};
use mermaid_mcp::session::registry::SessionRegistry;
use mermaid_mcp::{AppError, Result};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// `Accept` value required by the streamable transport.
pub const STREAMABLE_ACCEPT: &str = "application/json, text/event-stream";

/// Renderer returning canned output.
pub struct FakeRenderer {
    pub screenshot: &'static [u8],
    pub fail: bool,
}

impl DiagramRenderer for FakeRenderer {
    fn render<'a>(
        &'a self,
        _source: &'a str,
        _theme: &'a str,
        _background: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RenderedDiagram>> + Send + 'a>> {
        Box::pin(async move {
            if self.fail {
                return Err(AppError::Render("mmdc exited with status 1".into()));
            }
            Ok(RenderedDiagram {
                svg: "<svg>fake</svg>".into(),
                screenshot: Bytes::from_static(self.screenshot),
            })
        })
    }
}

/// Renderer that holds every render until `gate` is notified.
pub struct GatedRenderer {
    pub gate: Arc<Notify>,
}

impl DiagramRenderer for GatedRenderer {
    fn render<'a>(
        &'a self,
        _source: &'a str,
        _theme: &'a str,
        _background: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RenderedDiagram>> + Send + 'a>> {
        Box::pin(async move {
            self.gate.notified().await;
            Ok(RenderedDiagram {
                svg: "<svg>gated</svg>".into(),
                screenshot: Bytes::from_static(b"png"),
            })
        })
    }
}

/// One recorded upload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime_type: String,
    pub token: String,
}

/// Storage recording uploads in memory.
#[derive(Default)]
pub struct FakeStorage {
    pub uploads: Mutex<Vec<Upload>>,
}

impl FileStorage for FakeStorage {
    fn upload<'a>(
        &'a self,
        _bytes: Bytes,
        file_name: &'a str,
        mime_type: &'a str,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<FileArtifact>> + Send + 'a>> {
        Box::pin(async move {
            self.uploads.lock().expect("uploads lock").push(Upload {
                file_name: file_name.to_owned(),
                mime_type: mime_type.to_owned(),
                token: token.to_owned(),
            });
            Ok(FileArtifact {
                file_id: "file-1".into(),
                url: format!("https://files.test/{file_name}"),
                mime_type: mime_type.to_owned(),
            })
        })
    }
}

/// Minimal configuration with an ephemeral port.
pub fn test_config() -> GlobalConfig {
    GlobalConfig::from_toml_str(
        r#"
host = "127.0.0.1"
port = 0
enable_resumability = true
max_events_per_stream = 100

[renderer]
command = "mmdc"
timeout_seconds = 5
"#,
    )
    .expect("valid test config")
}

/// Running server plus handles for inspecting it.
pub struct TestServer {
    pub base_url: String,
    pub ct: CancellationToken,
    pub registry: SessionRegistry,
    pub storage: Arc<FakeStorage>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.ct.cancel();
    }
}

/// Spawn a server for `config` and `mode` on an ephemeral port.
pub async fn spawn_server_with(
    config: GlobalConfig,
    mode: ServerMode,
    renderer: impl DiagramRenderer + 'static,
) -> TestServer {
    let storage = Arc::new(FakeStorage::default());
    let state = HttpState::new(&config, mode, Arc::new(renderer), Arc::clone(&storage) as Arc<dyn FileStorage>);
    let registry = state.controller.registry().clone();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");

    let ct = CancellationToken::new();
    let server_ct = ct.clone();
    tokio::spawn(async move {
        let _ = serve_http(listener, state, server_ct).await;
    });

    TestServer {
        base_url: format!("http://{addr}"),
        ct,
        registry,
        storage,
    }
}

/// Spawn a default `http`-mode server with a working renderer.
pub async fn spawn_server() -> TestServer {
    spawn_server_with(
        test_config(),
        ServerMode::Http,
        FakeRenderer {
            screenshot: b"\x89PNG",
            fail: false,
        },
    )
    .await
}

/// A valid `initialize` request.
pub fn initialize_request(id: i64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": { "name": "integration-test", "version": "1.0.0" }
        }
    })
}

/// POST a JSON-RPC body to the streamable endpoint.
pub async fn post_mcp(
    client: &reqwest::Client,
    base_url: &str,
    session_id: Option<&str>,
    body: &Value,
) -> reqwest::Response {
    let mut request = client
        .post(format!("{base_url}/mcp"))
        .header("accept", STREAMABLE_ACCEPT)
        .header("content-type", "application/json")
        .body(body.to_string());
    if let Some(id) = session_id {
        request = request.header("mcp-session-id", id);
    }
    request.send().await.expect("POST /mcp")
}

/// Run the initialize handshake and return the new session id.
pub async fn initialize_session(client: &reqwest::Client, base_url: &str) -> String {
    let response = post_mcp(client, base_url, None, &initialize_request(1)).await;
    assert_eq!(response.status(), 200, "initialize must succeed");
    let session_id = response
        .headers()
        .get("mcp-session-id")
        .and_then(|value| value.to_str().ok())
        .expect("session id header")
        .to_owned();

    let initialized = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
    let response = post_mcp(client, base_url, Some(&session_id), &initialized).await;
    assert_eq!(response.status(), 202, "initialized notification accepted");

    session_id
}

/// One parsed server-sent event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub id: Option<String>,
    pub data: String,
}

/// Split an SSE payload into events.
pub fn sse_events(payload: &str) -> Vec<SseEvent> {
    payload
        .replace("\r\n", "\n")
        .split("\n\n")
        .filter_map(|block| {
            let mut id = None;
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("id:") {
                    id = Some(value.trim().to_owned());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.trim_start().to_owned());
                }
            }
            (id.is_some() || !data.is_empty()).then(|| SseEvent {
                id,
                data: data.join("\n"),
            })
        })
        .collect()
}

/// JSON-RPC messages carried by an SSE payload, skipping priming events.
pub fn sse_messages(payload: &str) -> Vec<Value> {
    sse_events(payload)
        .into_iter()
        .filter_map(|event| serde_json::from_str(&event.data).ok())
        .collect()
}

/// Read a complete SSE response and return its first JSON-RPC message.
pub async fn read_message(response: reqwest::Response) -> Value {
    let payload = tokio::time::timeout(Duration::from_secs(5), response.text())
        .await
        .expect("stream ends before timeout")
        .expect("readable body");
    sse_messages(&payload)
        .into_iter()
        .next()
        .unwrap_or_else(|| panic!("no JSON-RPC message in {payload:?}"))
}

/// Read SSE chunks until `needle` appears in the accumulated payload.
pub async fn read_until(response: &mut reqwest::Response, needle: &str) -> String {
    let mut buffer = String::new();
    while !buffer.contains(needle) {
        let chunk = tokio::time::timeout(Duration::from_secs(5), response.chunk())
            .await
            .expect("chunk before timeout")
            .expect("readable stream")
            .expect("stream still open");
        buffer.push_str(&String::from_utf8_lossy(&chunk));
    }
    buffer
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..50 {
        if check() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    check()
}
