//! Procedure journey: a validated positive recipe outranks a failing
//! negative one on the same task, and a fresh failure halves its score.

use mnemo_e2e_tests::engine_in;
use mnemo_core::{ProcedureInput, ProcedureType, ScopeFilter};
use tempfile::tempdir;

#[test]
fn positive_validated_outranks_negative() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());
    let store = engine.store_ref();

    let mut good = ProcedureInput::new(
        "deploy the payments service",
        r#"{"steps": ["build", "canary", "promote"]}"#,
    );
    good.success_count = 5;
    let good = store.upsert_procedure(good).unwrap();
    store.record_procedure_success(&good.id, None, None).unwrap();

    let mut bad = ProcedureInput::new(
        "deploy the payments service straight to prod",
        r#"{"warning": "skips the canary"}"#,
    );
    bad.procedure_type = ProcedureType::Negative;
    bad.failure_count = 3;
    let bad = store.upsert_procedure(bad).unwrap();
    store.record_procedure_failure(&bad.id, None, None).unwrap();

    let hits = store
        .search_procedures_ranked("deploy payments service", 5, 0.1, &ScopeFilter::default())
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].procedure.id, good.id);
    assert_eq!(hits[1].procedure.id, bad.id);

    // A failure right now halves the winner's score
    let before = hits[0].score;
    store.record_procedure_failure(&good.id, None, None).unwrap();
    let rescored = store
        .search_procedures_ranked("deploy payments service", 5, 0.1, &ScopeFilter::default())
        .unwrap();
    let after = rescored
        .iter()
        .find(|h| h.procedure.id == good.id)
        .unwrap()
        .score;
    assert!(after < before * 0.75);
}

#[test]
fn confidence_tracks_counters() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());
    let store = engine.store_ref();

    let procedure = store
        .upsert_procedure(ProcedureInput::new("rotate the signing keys", "{}"))
        .unwrap();
    assert!((procedure.confidence - 0.5).abs() < 1e-9);

    for session in ["s1", "s2", "s3"] {
        store
            .record_procedure_success(&procedure.id, None, Some(session))
            .unwrap();
    }
    let after = store.get_procedure(&procedure.id).unwrap().unwrap();
    assert_eq!(after.success_count, 3);
    assert!((after.confidence - 0.8).abs() < 1e-9);

    // Replayed session ids never recount
    store
        .record_procedure_success(&procedure.id, None, Some("s1"))
        .unwrap();
    assert_eq!(
        store
            .get_procedure(&procedure.id)
            .unwrap()
            .unwrap()
            .success_count,
        3
    );
}

#[test]
fn negative_recipes_surface_as_warnings() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());
    let store = engine.store_ref();

    let mut warn = ProcedureInput::new("edit the production database by hand", "{}");
    warn.procedure_type = ProcedureType::Negative;
    store.upsert_procedure(warn).unwrap();

    let warnings = store
        .get_negative_procedures_matching("production database", 5)
        .unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].procedure_type, ProcedureType::Negative);
}
