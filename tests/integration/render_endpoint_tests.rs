//! Integration tests for `POST /render`.

use serde_json::{json, Value};

use mermaid_mcp::mode::ServerMode;

use super::test_helpers::{spawn_server, spawn_server_with, test_config, FakeRenderer};

async fn render(
    base_url: &str,
    token: Option<&str>,
    body: &str,
) -> (reqwest::StatusCode, Value) {
    let mut request = reqwest::Client::new()
        .post(format!("{base_url}/render"))
        .header("content-type", "application/json")
        .body(body.to_owned());
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let response = request.send().await.expect("POST /render");
    let status = response.status();
    (status, response.json().await.expect("json body"))
}

#[tokio::test]
async fn missing_authorization_is_unauthorized_regardless_of_body() {
    let server = spawn_server().await;

    for body in ["{}", "not json", r#"{"mermaid":"graph TD;A-->B;"}"#] {
        let (status, envelope) = render(&server.base_url, None, body).await;
        assert_eq!(status, 401);
        assert_eq!(
            envelope["error"]["message"],
            "Missing or invalid Authorization header"
        );
    }
}

#[tokio::test]
async fn default_output_uploads_png() {
    let server = spawn_server().await;

    let (status, body) = render(
        &server.base_url,
        Some("secret-token"),
        &json!({ "mermaid": "graph TD;A-->B;" }).to_string(),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["mimeType"], "image/png");
    assert_eq!(body["fileId"], "file-1");
    assert!(body["url"].as_str().is_some_and(|url| url.ends_with(".png")));

    let uploads = server.storage.uploads.lock().expect("uploads lock").clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].token, "secret-token");
    assert_eq!(uploads[0].mime_type, "image/png");
    assert!(uploads[0].file_name.starts_with("mermaid-default-"));
}

#[tokio::test]
async fn svg_output_is_returned_inline() {
    let server = spawn_server().await;

    let (status, body) = render(
        &server.base_url,
        Some("t"),
        &json!({ "mermaid": "graph TD;A-->B;", "outputType": "svg", "theme": "dark" }).to_string(),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["mimeType"], "image/svg+xml");
    assert_eq!(body["svg"], "<svg>fake</svg>");
    assert!(server.storage.uploads.lock().expect("uploads lock").is_empty());
}

#[tokio::test]
async fn mermaid_output_echoes_source() {
    let server = spawn_server().await;

    let (status, body) = render(
        &server.base_url,
        Some("t"),
        &json!({ "mermaid": "graph LR;X-->Y;", "outputType": "mermaid" }).to_string(),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body, json!({ "mermaid": "graph LR;X-->Y;", "mimeType": "text/plain" }));
}

#[tokio::test]
async fn empty_or_missing_mermaid_is_bad_request() {
    let server = spawn_server().await;

    for body in [json!({}), json!({ "mermaid": "   " }), json!({ "mermaid": 3 })] {
        let (status, envelope) = render(&server.base_url, Some("t"), &body.to_string()).await;
        assert_eq!(status, 400, "{body}");
        assert!(envelope["error"]["message"]
            .as_str()
            .is_some_and(|msg| msg.contains("mermaid")));
    }
}

#[tokio::test]
async fn unknown_output_type_is_bad_request() {
    let server = spawn_server().await;

    let (status, _) = render(
        &server.base_url,
        Some("t"),
        &json!({ "mermaid": "graph TD;A-->B;", "outputType": "gif" }).to_string(),
    )
    .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn renderer_failure_is_generic_server_error() {
    let server = spawn_server_with(
        test_config(),
        ServerMode::Http,
        FakeRenderer {
            screenshot: b"png",
            fail: true,
        },
    )
    .await;

    let (status, body) = render(
        &server.base_url,
        Some("t"),
        &json!({ "mermaid": "graph TD;A-->B;" }).to_string(),
    )
    .await;
    assert_eq!(status, 500);
    assert_eq!(body["error"]["message"], "Failed to render diagram");
}

#[tokio::test]
async fn empty_screenshot_is_server_error() {
    let server = spawn_server_with(
        test_config(),
        ServerMode::Http,
        FakeRenderer {
            screenshot: b"",
            fail: false,
        },
    )
    .await;

    let (status, _) = render(
        &server.base_url,
        Some("t"),
        &json!({ "mermaid": "graph TD;A-->B;" }).to_string(),
    )
    .await;
    assert_eq!(status, 500);
    assert!(server.storage.uploads.lock().expect("uploads lock").is_empty());
}
