//! Scope journey: user/agent/session partitions are invisible to other
//! identities, session scratch is prunable, and promotion re-homes a fact.

use mnemo_e2e_tests::engine_in;
use mnemo_core::{FactInput, QueryOptions, Scope, ScopeFilter, SearchOptions};
use tempfile::tempdir;

fn scoped(text: &str, scope: Scope, target: &str) -> FactInput {
    let mut input = FactInput::new(text);
    input.scope = Some(scope);
    input.scope_target = Some(target.to_string());
    input
}

fn for_user(user: &str) -> SearchOptions {
    SearchOptions {
        query: QueryOptions {
            scope: ScopeFilter::for_user(user),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn user_scope_is_invisible_to_others() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());

    engine
        .store(scoped("X marks the spot", Scope::User, "alice"))
        .unwrap();

    // Wrong identity: no match
    assert!(engine.search("marks spot", 10, &for_user("bob")).unwrap().is_empty());

    // Right identity: visible
    assert_eq!(engine.search("marks spot", 10, &for_user("alice")).unwrap().len(), 1);

    // No identity at all: only global facts
    assert!(engine
        .search("marks spot", 10, &SearchOptions::default())
        .unwrap()
        .is_empty());
}

#[test]
fn global_rows_are_visible_to_everyone() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());

    engine.store(FactInput::new("shared team convention")).unwrap();
    engine
        .store(scoped("alice's private convention", Scope::User, "alice"))
        .unwrap();

    let bob = engine.search("convention", 10, &for_user("bob")).unwrap();
    assert_eq!(bob.len(), 1);

    let alice = engine.search("convention", 10, &for_user("alice")).unwrap();
    assert_eq!(alice.len(), 2);
}

#[test]
fn session_prune_and_promotion() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());
    let store = engine.store_ref();

    let keeper = engine
        .store(scoped("discovered build flag", Scope::Session, "sess-1"))
        .unwrap();
    engine
        .store(scoped("temporary scratch", Scope::Session, "sess-1"))
        .unwrap();

    // Promote the keeper before sweeping the session
    store
        .promote_scope(&keeper.id, Scope::User, Some("alice"))
        .unwrap();
    assert_eq!(store.prune_session_scope("sess-1").unwrap(), 1);

    let survivor = store.get_by_id(&keeper.id).unwrap().unwrap();
    assert_eq!(survivor.scope, Scope::User);
    assert_eq!(survivor.scope_target.as_deref(), Some("alice"));

    let scopes = store.unique_scopes().unwrap();
    assert!(scopes.contains(&(Scope::User, Some("alice".into()))));
    assert!(!scopes
        .iter()
        .any(|(scope, _)| *scope == Scope::Session));
}

#[test]
fn agent_scope_partitions() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());

    engine
        .store(scoped("helper remembers the prompt style", Scope::Agent, "helper"))
        .unwrap();

    let helper = SearchOptions {
        query: QueryOptions {
            scope: ScopeFilter {
                agent_id: Some("helper".into()),
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    };
    assert_eq!(engine.search("prompt style", 10, &helper).unwrap().len(), 1);

    let other = SearchOptions {
        query: QueryOptions {
            scope: ScopeFilter {
                agent_id: Some("other-agent".into()),
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    };
    assert!(engine.search("prompt style", 10, &other).unwrap().is_empty());
}
