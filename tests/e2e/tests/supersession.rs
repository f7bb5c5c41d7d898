//! Supersession journey: a corrected fact hides its predecessor by default,
//! keeps it reachable with include_superseded, and point-in-time queries see
//! whichever version was true at the asked instant.

use mnemo_e2e_tests::engine_in;
use mnemo_core::{FactInput, QueryOptions};
use tempfile::tempdir;

fn triple(text: &str, value: &str) -> FactInput {
    let mut input = FactInput::new(text);
    input.entity = Some("system".into());
    input.key = Some("db".into());
    input.value = Some(value.into());
    input
}

#[test]
fn supersession_lifecycle() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());

    let postgres = engine.store(triple("DB is Postgres", "postgres")).unwrap();

    // The versions need distinct second-resolution validity boundaries
    std::thread::sleep(std::time::Duration::from_millis(1100));
    let between = chrono::Utc::now();
    std::thread::sleep(std::time::Duration::from_millis(1100));

    let mut mysql = triple("DB is MySQL", "mysql");
    mysql.supersedes_id = Some(postgres.id.clone());
    let mysql = engine.store(mysql).unwrap();

    // Default lookup: only the successor
    let current = engine
        .lookup("system", Some("db"), &QueryOptions::default())
        .unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].fact.id, mysql.id);

    // include_superseded: both versions
    let all = engine
        .lookup(
            "system",
            Some("db"),
            &QueryOptions {
                include_superseded: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(all.len(), 2);

    // As-of between the writes: only the predecessor
    let past = engine
        .lookup(
            "system",
            Some("db"),
            &QueryOptions {
                as_of: Some(between),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(past.len(), 1);
    assert_eq!(past[0].fact.id, postgres.id);

    // Bi-temporal bookkeeping on the rows themselves
    let old_row = engine.store_ref().get_by_id(&postgres.id).unwrap().unwrap();
    let new_row = engine.store_ref().get_by_id(&mysql.id).unwrap().unwrap();
    assert_eq!(old_row.superseded_by.as_deref(), Some(mysql.id.as_str()));
    assert_eq!(new_row.supersedes_id.as_deref(), Some(postgres.id.as_str()));
    assert_eq!(old_row.valid_until, Some(new_row.valid_from));
    assert!(new_row.valid_until.is_none());
}

#[test]
fn retraction_without_successor() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());

    let fact = engine.store(triple("DB is Postgres", "postgres")).unwrap();
    assert!(engine.supersede(&fact.id, None).unwrap());

    let current = engine
        .lookup("system", Some("db"), &QueryOptions::default())
        .unwrap();
    assert!(current.is_empty());

    let row = engine.store_ref().get_by_id(&fact.id).unwrap().unwrap();
    assert!(row.superseded_at.is_some());
    assert!(row.superseded_by.is_none());
    assert!(row.valid_until.is_some());
}
