//! Integration tests for the HTTP health endpoint.
//!
//! Validates that `GET /health` returns `200 OK` with body `"ok"` in every
//! HTTP mode and that unknown routes get the JSON 404 body.

use mermaid_mcp::mode::ServerMode;

use super::test_helpers::{spawn_server, spawn_server_with, test_config, FakeRenderer};

#[tokio::test]
async fn health_returns_ok() {
    let server = spawn_server().await;

    let resp = reqwest::get(format!("{}/health", server.base_url))
        .await
        .expect("GET /health");

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.expect("body"), "ok");
}

#[tokio::test]
async fn health_is_served_in_sse_mode() {
    let server = spawn_server_with(
        test_config(),
        ServerMode::Sse,
        FakeRenderer {
            screenshot: b"png",
            fail: false,
        },
    )
    .await;

    let resp = reqwest::get(format!("{}/health", server.base_url))
        .await
        .expect("GET /health");
    assert_eq!(resp.status(), 200);

    let mcp = reqwest::Client::new()
        .post(format!("{}/mcp", server.base_url))
        .send()
        .await
        .expect("POST /mcp");
    assert_eq!(mcp.status(), 404);
}

#[tokio::test]
async fn unknown_route_is_json_not_found() {
    let server = spawn_server().await;

    let resp = reqwest::get(format!("{}/nope", server.base_url))
        .await
        .expect("GET /nope");
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.expect("json body");
    assert_eq!(body, serde_json::json!({ "error": { "message": "Not found" } }));
}
