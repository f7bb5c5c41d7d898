//! Hybrid journey: the vector index catches paraphrases the keyword index
//! misses, superseded rows are filtered out of vector results, and the
//! classify-before-write path resolves contradictions.

use std::sync::Arc;

use mnemo_e2e_tests::{engine_with_embedder, MockEmbedder, ScriptedChat};
use mnemo_core::{
    FactInput, MatchKind, Memory, MemoryConfig, SearchOptions, WriteDecision,
};
use tempfile::tempdir;

fn vector_opts() -> SearchOptions {
    SearchOptions {
        vector: true,
        // The mock embedder produces coarse vectors; keep the gate low
        min_score: Some(0.05),
        ..Default::default()
    }
}

#[test]
fn vector_index_mirrors_writes() {
    let dir = tempdir().unwrap();
    let engine = engine_with_embedder(dir.path());

    engine
        .store(FactInput::new("the payment gateway retries three times"))
        .unwrap();

    let hits = engine
        .search("payment gateway retries", 10, &vector_opts())
        .unwrap();
    assert_eq!(hits.len(), 1);
    // Both indexes agreed on the row
    assert_eq!(hits[0].match_kind, MatchKind::Both);
    assert!(hits[0].keyword_score.is_some());
    assert!(hits[0].vector_score.is_some());
}

#[test]
fn superseded_rows_filtered_from_vector_results() {
    let dir = tempdir().unwrap();
    let engine = engine_with_embedder(dir.path());

    let old = engine
        .store(FactInput::new("the gateway timeout is thirty seconds"))
        .unwrap();
    let mut new = FactInput::new("the gateway timeout is ninety seconds");
    new.supersedes_id = Some(old.id.clone());
    engine.store(new).unwrap();

    let hits = engine
        .search("gateway timeout seconds", 10, &vector_opts())
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.fact.id != old.id));
}

#[test]
fn deleted_facts_leave_both_indexes() {
    let dir = tempdir().unwrap();
    let engine = engine_with_embedder(dir.path());

    let fact = engine
        .store(FactInput::new("ephemeral statement about caching"))
        .unwrap();
    engine.delete(&fact.id).unwrap();

    assert!(engine
        .search("ephemeral caching statement", 10, &vector_opts())
        .unwrap()
        .is_empty());
}

#[test]
fn classification_resolves_contradictions() {
    let dir = tempdir().unwrap();
    let mut config = MemoryConfig::in_dir(dir.path());
    config.embedder = Some(Arc::new(MockEmbedder::default()));
    config.chat = Some(Arc::new(ScriptedChat {
        reply: "UPDATE 1".into(),
    }));
    config.chat_models = vec!["classifier-small".into()];
    let engine = Memory::open(config).unwrap();

    let mut first = FactInput::new("the retention window is 30 days");
    first.entity = Some("system".into());
    first.key = Some("retention".into());
    let first = engine.store(first).unwrap();

    let mut second = FactInput::new("the retention window is 90 days");
    second.entity = Some("system".into());
    second.key = Some("retention".into());
    let receipt = engine.store_classified(second, true).unwrap();

    assert!(matches!(
        receipt.decision,
        WriteDecision::Superseded { ref old_id } if *old_id == first.id
    ));

    let current = engine
        .lookup("system", Some("retention"), &Default::default())
        .unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].fact.text, "the retention window is 90 days");
}

#[test]
fn noop_classification_drops_duplicate() {
    let dir = tempdir().unwrap();
    let mut config = MemoryConfig::in_dir(dir.path());
    config.chat = Some(Arc::new(ScriptedChat {
        reply: "NOOP 1".into(),
    }));
    config.chat_models = vec!["classifier-small".into()];
    let engine = Memory::open(config).unwrap();

    let mut first = FactInput::new("the linter runs in CI");
    first.entity = Some("ci".into());
    first.key = Some("linter".into());
    let first = engine.store(first).unwrap();

    let mut duplicate = FactInput::new("CI runs the linter");
    duplicate.entity = Some("ci".into());
    duplicate.key = Some("linter".into());
    let receipt = engine.store_classified(duplicate, true).unwrap();

    assert!(matches!(
        receipt.decision,
        WriteDecision::Noop { ref existing_id } if *existing_id == first.id
    ));
    assert_eq!(engine.stats().unwrap().total_facts, 1);
}
