//! Crash journey: entries that reached the journal but not the store are
//! replayed on the next open, and the journal drains to empty.

use mnemo_e2e_tests::engine_in;
use mnemo_core::{new_fact_id, FactInput, WalEntry, WalOperation, WriteAheadLog};
use tempfile::tempdir;

#[test]
fn journaled_store_survives_crash() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("memory.wal");

    // Crash before the relational commit: only the journal has the write
    let id = new_fact_id();
    {
        let wal = WriteAheadLog::new(&wal_path);
        let input = FactInput::new("journaled just before the crash");
        wal.append(&WalEntry::new(
            id.clone(),
            WalOperation::Store,
            serde_json::to_value(&input).unwrap(),
        ))
        .unwrap();
    }

    let engine = engine_in(dir.path());
    let recovered = engine.store_ref().get_by_id(&id).unwrap().unwrap();
    assert_eq!(recovered.text, "journaled just before the crash");

    // Journal fully drained after recovery
    assert_eq!(engine.pending_journal_entries().unwrap(), 0);
    assert!(!wal_path.exists());
}

#[test]
fn journaled_delete_survives_crash() {
    let dir = tempdir().unwrap();

    let fact_id = {
        let engine = engine_in(dir.path());
        engine.store(FactInput::new("doomed by the journal")).unwrap().id
    };

    // Crash after journaling the delete but before applying it
    {
        let wal = WriteAheadLog::new(dir.path().join("memory.wal"));
        wal.append(&WalEntry::new(
            fact_id.clone(),
            WalOperation::Delete,
            serde_json::json!(null),
        ))
        .unwrap();
    }

    let engine = engine_in(dir.path());
    assert!(engine.store_ref().get_by_id(&fact_id).unwrap().is_none());
    assert_eq!(engine.pending_journal_entries().unwrap(), 0);
}

#[test]
fn replay_of_committed_write_is_noop() {
    let dir = tempdir().unwrap();

    let fact = {
        let engine = engine_in(dir.path());
        engine.store(FactInput::new("durable before the crash")).unwrap()
    };

    // A crash between the relational commit and the tombstone leaves the
    // entry behind; replaying it must not duplicate the fact.
    {
        let wal = WriteAheadLog::new(dir.path().join("memory.wal"));
        wal.append(&WalEntry::new(
            fact.id.clone(),
            WalOperation::Store,
            serde_json::to_value(&FactInput::new("durable before the crash")).unwrap(),
        ))
        .unwrap();
    }

    let engine = engine_in(dir.path());
    assert_eq!(engine.stats().unwrap().total_facts, 1);
    assert_eq!(engine.pending_journal_entries().unwrap(), 0);
}

#[test]
fn corrupt_journal_lines_do_not_block_recovery() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("memory.wal");

    let id = new_fact_id();
    {
        let wal = WriteAheadLog::new(&wal_path);
        wal.append(&WalEntry::new(
            id.clone(),
            WalOperation::Store,
            serde_json::to_value(&FactInput::new("good entry")).unwrap(),
        ))
        .unwrap();
        // Torn write at the crash point
        use std::io::Write;
        std::fs::OpenOptions::new()
            .append(true)
            .open(&wal_path)
            .unwrap()
            .write_all(b"{\"id\": \"torn")
            .unwrap();
    }

    let engine = engine_in(dir.path());
    assert!(engine.store_ref().get_by_id(&id).unwrap().is_some());
}
