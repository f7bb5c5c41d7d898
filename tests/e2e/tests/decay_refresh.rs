//! Decay journey: classification at store time, and the access-on-touch
//! TTL refresh when a search returns a stable/active fact.

use mnemo_e2e_tests::engine_in;
use mnemo_core::{ttl_for, DecayClass, FactInput, SearchOptions};
use tempfile::tempdir;

#[test]
fn active_fact_refreshes_on_search() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());

    let mut input = FactInput::new("Working on feature X");
    input.entity = Some("user".into());
    input.key = Some("task".into());
    let stored = engine.store(input).unwrap();
    assert_eq!(stored.decay_class, DecayClass::Active);
    let initial_expiry = stored.expires_at.expect("active facts expire");

    std::thread::sleep(std::time::Duration::from_millis(1100));

    let hits = engine
        .search("feature X", 10, &SearchOptions::default())
        .unwrap();
    assert_eq!(hits.len(), 1);

    let refreshed = engine.store_ref().get_by_id(&stored.id).unwrap().unwrap();
    let new_expiry = refreshed.expires_at.unwrap();
    assert!(new_expiry > initial_expiry);

    // Extended to now + the active TTL
    let ttl = ttl_for(DecayClass::Active).unwrap();
    let remaining = new_expiry - chrono::Utc::now();
    assert!((remaining - ttl).num_seconds().abs() < 5);
}

#[test]
fn permanent_facts_never_expire() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());

    let mut input = FactInput::new("We decided to ship weekly");
    input.entity = Some("decision".into());
    let stored = engine.store(input).unwrap();

    assert_eq!(stored.decay_class, DecayClass::Permanent);
    assert!(stored.expires_at.is_none());

    engine
        .search("ship weekly", 10, &SearchOptions::default())
        .unwrap();
    let after = engine.store_ref().get_by_id(&stored.id).unwrap().unwrap();
    assert!(after.expires_at.is_none());
    assert_eq!(after.recall_count, 1);
}

#[test]
fn session_scratch_gets_short_ttl() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());

    let stored = engine
        .store(FactInput::new("debugging the tokenizer right now"))
        .unwrap();
    assert_eq!(stored.decay_class, DecayClass::Session);

    let ttl = ttl_for(DecayClass::Session).unwrap();
    let remaining = stored.expires_at.unwrap() - chrono::Utc::now();
    assert!((remaining - ttl).num_seconds().abs() < 5);
    assert!(ttl < ttl_for(DecayClass::Active).unwrap());
}
