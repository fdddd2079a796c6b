//! Unit tests for `SessionRegistry` bookkeeping.

use std::sync::Arc;

use mermaid_mcp::session::registry::SessionRegistry;
use mermaid_mcp::session::{Session, SessionMode};
use mermaid_mcp::transport::sse::SseTransport;
use mermaid_mcp::transport::{ServerHandle, TransportEvent, TransportObserver};
use tokio_util::sync::CancellationToken;

struct Ignore;

impl TransportObserver for Ignore {
    fn on_event(&self, _event: TransportEvent) {}
}

fn session(id: &str) -> Session {
    let transport = SseTransport::new("/messages", Arc::new(Ignore));
    Session::new(
        id.to_owned(),
        transport.into(),
        ServerHandle::new(CancellationToken::new()),
    )
}

#[test]
fn insert_and_lookup_by_id() {
    let registry = SessionRegistry::new();
    assert!(registry.is_empty());
    assert!(registry.insert(session("a")));

    let found = registry.get("a").expect("registered");
    assert_eq!(found.id(), "a");
    assert_eq!(found.mode(), SessionMode::Sse);
    assert_eq!(registry.len(), 1);
}

#[test]
fn lookup_does_not_cross_sessions() {
    let registry = SessionRegistry::new();
    registry.insert(session("b"));

    assert!(registry.get("a").is_none());
    assert!(!registry.contains("a"));
    assert!(registry.contains("b"));
}

#[test]
fn duplicate_id_keeps_first_entry() {
    let registry = SessionRegistry::new();
    assert!(registry.insert(session("dup")));
    let original = registry.get("dup").expect("first").created_at();

    assert!(!registry.insert(session("dup")));
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get("dup").expect("still first").created_at(), original);
}

#[test]
fn remove_returns_entry_once() {
    let registry = SessionRegistry::new();
    registry.insert(session("x"));

    assert!(registry.remove("x").is_some());
    assert!(registry.remove("x").is_none());
    assert!(registry.is_empty());
}

#[test]
fn clones_share_state() {
    let registry = SessionRegistry::new();
    let view = registry.clone();
    registry.insert(session("shared"));

    assert!(view.contains("shared"));
    let mut ids = view.ids();
    ids.sort();
    assert_eq!(ids, vec!["shared".to_owned()]);
    assert_eq!(view.snapshot().len(), 1);
}
