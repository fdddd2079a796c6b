//! Unit tests for request classification per server mode.

use axum::http::Method;
use mermaid_mcp::config::EndpointConfig;
use mermaid_mcp::http::route::{Endpoints, Route};
use mermaid_mcp::mode::ServerMode;

fn endpoints(mode: ServerMode) -> Endpoints {
    Endpoints::for_mode(&EndpointConfig::default(), mode)
}

#[test]
fn http_mode_routes_every_surface() {
    let e = endpoints(ServerMode::Http);
    assert_eq!(e.classify(&Method::GET, "/sse"), Route::SseConnect);
    assert_eq!(e.classify(&Method::POST, "/messages"), Route::SseMessage);
    assert_eq!(e.classify(&Method::POST, "/mcp"), Route::StreamablePost);
    assert_eq!(e.classify(&Method::GET, "/mcp"), Route::StreamableGet);
    assert_eq!(e.classify(&Method::DELETE, "/mcp"), Route::StreamableDelete);
    assert_eq!(e.classify(&Method::POST, "/render"), Route::Render);
    assert_eq!(e.classify(&Method::GET, "/health"), Route::Health);
    assert_eq!(e.message_path(), Some("/messages"));
}

#[test]
fn sse_mode_hides_streamable_path() {
    let e = endpoints(ServerMode::Sse);
    assert_eq!(e.classify(&Method::POST, "/mcp"), Route::Unmatched);
    assert_eq!(e.classify(&Method::GET, "/sse"), Route::SseConnect);
    assert_eq!(e.classify(&Method::POST, "/render"), Route::Render);
}

#[test]
fn streamable_mode_hides_sse_paths() {
    let e = endpoints(ServerMode::Streamable);
    assert_eq!(e.classify(&Method::GET, "/sse"), Route::Unmatched);
    assert_eq!(e.classify(&Method::POST, "/messages"), Route::Unmatched);
    assert_eq!(e.classify(&Method::POST, "/mcp"), Route::StreamablePost);
    assert_eq!(e.message_path(), None);
}

#[test]
fn custom_paths_are_honoured() {
    let config = EndpointConfig {
        sse_path: "/events".into(),
        message_path: "/post".into(),
        streamable_path: "/rpc".into(),
    };
    let e = Endpoints::for_mode(&config, ServerMode::Http);
    assert_eq!(e.classify(&Method::GET, "/events"), Route::SseConnect);
    assert_eq!(e.classify(&Method::POST, "/post"), Route::SseMessage);
    assert_eq!(e.classify(&Method::POST, "/rpc"), Route::StreamablePost);
    assert_eq!(e.classify(&Method::GET, "/sse"), Route::Unmatched);
}

#[test]
fn unknown_path_is_unmatched() {
    let e = endpoints(ServerMode::Http);
    assert_eq!(e.classify(&Method::GET, "/"), Route::Unmatched);
    assert_eq!(e.classify(&Method::POST, "/health"), Route::Unmatched);
}
