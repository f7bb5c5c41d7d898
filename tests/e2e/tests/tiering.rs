//! Tiering journey: compaction promotes blockers into the hot tier under
//! the configured budgets and leaves everything else alone.

use mnemo_e2e_tests::engine_in;
use mnemo_core::{CompactionOptions, FactInput, Tier};
use tempfile::tempdir;

fn blocker(text: &str) -> FactInput {
    let mut input = FactInput::new(text);
    input.tags = vec!["blocker".into()];
    input
}

#[test]
fn compaction_respects_hot_budget() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());
    let store = engine.store_ref();

    let a = engine.store(blocker("blocked on the CI runner")).unwrap();
    let b = engine.store(blocker("blocked on code review")).unwrap();
    let c = engine.store(blocker("blocked on the infra ticket")).unwrap();
    let bystander = engine.store(FactInput::new("everyday note")).unwrap();

    let report = store
        .run_compaction(&CompactionOptions {
            inactive_preference_days: 14,
            hot_max_facts: 2,
            hot_max_tokens: 1_000_000,
        })
        .unwrap();
    assert_eq!(report.blockers_promoted, 2);

    let tiers: Vec<Tier> = [&a, &b, &c]
        .iter()
        .map(|f| store.get_by_id(&f.id).unwrap().unwrap().tier)
        .collect();
    assert_eq!(tiers.iter().filter(|t| **t == Tier::Hot).count(), 2);
    assert_eq!(tiers.iter().filter(|t| **t == Tier::Warm).count(), 1);

    // Untagged rows do not change tier
    assert_eq!(
        store.get_by_id(&bystander.id).unwrap().unwrap().tier,
        Tier::Warm
    );
}

#[test]
fn hot_facts_pack_within_token_budget() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());
    let store = engine.store_ref();

    let small = engine.store(blocker("blocked briefly")).unwrap();
    let large = engine
        .store(blocker(&"blocked on an extremely verbose description ".repeat(40)))
        .unwrap();
    store.set_tier(&small.id, Tier::Hot).unwrap();
    store.set_tier(&large.id, Tier::Hot).unwrap();

    // Budget admits only the small fact; the oversized one is skipped
    let packed = store.get_hot_facts(16).unwrap();
    assert_eq!(packed.len(), 1);
    assert_eq!(packed[0].id, small.id);

    // A roomy budget returns both
    assert_eq!(store.get_hot_facts(1_000_000).unwrap().len(), 2);
}

#[test]
fn cold_tier_needs_opt_in() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());
    let store = engine.store_ref();

    let fact = engine.store(FactInput::new("archived design sketch")).unwrap();
    store.set_tier(&fact.id, Tier::Cold).unwrap();

    let default_hits = engine
        .search("archived design", 10, &Default::default())
        .unwrap();
    assert!(default_hits.is_empty());

    let opts = mnemo_core::SearchOptions {
        query: mnemo_core::QueryOptions {
            include_cold: true,
            ..Default::default()
        },
        ..Default::default()
    };
    assert_eq!(engine.search("archived design", 10, &opts).unwrap().len(), 1);
}
