//! Integration tests for the legacy SSE transport (`/sse` + `/messages`).

use serde_json::{json, Value};

use super::test_helpers::{initialize_request, initialize_session, read_until, spawn_server};

/// Extract the session id from the `endpoint` event payload.
fn session_id_from(payload: &str) -> String {
    let start = payload.find("sessionId=").expect("endpoint carries sessionId") + "sessionId=".len();
    payload[start..]
        .chars()
        .take_while(|c| !c.is_whitespace())
        .collect()
}

async fn open_sse(base_url: &str) -> (reqwest::Response, String) {
    let mut response = reqwest::get(format!("{base_url}/sse"))
        .await
        .expect("GET /sse");
    assert_eq!(response.status(), 200);
    assert!(response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/event-stream")));

    let payload = read_until(&mut response, "sessionId=").await;
    assert!(payload.contains("endpoint"));
    assert!(payload.contains("/messages?sessionId="));
    (response, session_id_from(&payload))
}

#[tokio::test]
async fn sse_connect_registers_session_and_announces_endpoint() {
    let server = spawn_server().await;
    let (mut stream, session_id) = open_sse(&server.base_url).await;

    assert!(server.registry.contains(&session_id));
    let payload = read_until(&mut stream, "SSE connection established").await;
    assert!(payload.contains("notifications/message"));
}

#[tokio::test]
async fn posted_message_is_accepted_and_answered_on_stream() {
    let server = spawn_server().await;
    let (mut stream, session_id) = open_sse(&server.base_url).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!(
            "{}/messages?sessionId={session_id}",
            server.base_url
        ))
        .header("content-type", "application/json")
        .body(initialize_request(7).to_string())
        .send()
        .await
        .expect("POST /messages");
    assert_eq!(response.status(), 202);
    assert_eq!(response.text().await.expect("body"), "Accepted");

    let payload = read_until(&mut stream, "protocolVersion").await;
    assert!(payload.contains("\"id\":7"));
}

#[tokio::test]
async fn message_without_or_with_unknown_session_is_rejected() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();
    let body = json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }).to_string();

    for url in [
        format!("{}/messages", server.base_url),
        format!("{}/messages?sessionId=", server.base_url),
        format!("{}/messages?sessionId=nope", server.base_url),
    ] {
        let response = client
            .post(&url)
            .header("content-type", "application/json")
            .body(body.clone())
            .send()
            .await
            .expect("POST /messages");
        assert_eq!(response.status(), 400, "{url}");
        let envelope: Value = response.json().await.expect("json body");
        assert_eq!(envelope["error"]["code"], -32000);
    }
    assert!(server.registry.is_empty());
}

#[tokio::test]
async fn streamable_session_id_is_unknown_on_message_path() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();
    let streamable_id = initialize_session(&client, &server.base_url).await;

    let response = client
        .post(format!(
            "{}/messages?sessionId={streamable_id}",
            server.base_url
        ))
        .header("content-type", "application/json")
        .body(json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }).to_string())
        .send()
        .await
        .expect("POST /messages");
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn malformed_message_is_a_parse_error() {
    let server = spawn_server().await;
    let (_stream, session_id) = open_sse(&server.base_url).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!(
            "{}/messages?sessionId={session_id}",
            server.base_url
        ))
        .header("content-type", "application/json")
        .body("{oops")
        .send()
        .await
        .expect("POST /messages");
    assert_eq!(response.status(), 400);
    let envelope: Value = response.json().await.expect("json body");
    assert_eq!(envelope["error"]["code"], -32700);
}
