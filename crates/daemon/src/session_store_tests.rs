use tracectl_core::SessionId;

use super::*;

#[test]
fn ensure_is_idempotent() {
    let store = SessionStore::new();
    let id = SessionId::new("sess-1");
    store.ensure(&id, 1000, 1000);
    store.ensure(&id, 1000, 1000);
    assert_eq!(store.ids().len(), 1);
}

#[test]
fn with_mut_mutates_in_place() {
    let store = SessionStore::new();
    let id = SessionId::new("sess-2");
    store.ensure(&id, 1000, 1000);
    store.with_mut(&id, |session| session.started = true).expect("session present");
    assert!(store.get(&id).expect("session present").started);
}

#[test]
fn with_mut_on_missing_session_returns_none() {
    let store = SessionStore::new();
    let result = store.with_mut(&SessionId::new("missing"), |session| session.started = true);
    assert!(result.is_none());
}
