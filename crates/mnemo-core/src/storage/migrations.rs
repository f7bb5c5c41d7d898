//! Database Migrations
//!
//! Schema evolution for the fact store. Migrations are additive and
//! idempotent: versioned batches create tables, a probe-gated column list
//! covers additive ALTERs even when the version table was lost, and a
//! one-shot fix-up repairs timestamps that were stored in milliseconds.

use rusqlite::Connection;

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: facts, FTS index, links, procedures",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Reinforcement quote queues on facts and procedures",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Skill promotion metadata on procedures",
        up: MIGRATION_V3_UP,
    },
    Migration {
        version: 4,
        description: "FTS porter tokenizer rebuild",
        up: MIGRATION_V4_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS facts (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,

    -- Normalized triple
    entity TEXT,
    key TEXT,
    value TEXT,
    category TEXT,
    summary TEXT,

    -- Tags with comma sentinels: ',a,b,' ('' = none)
    tags TEXT NOT NULL DEFAULT '',

    -- Provenance
    source TEXT,
    source_sessions TEXT NOT NULL DEFAULT '[]',
    source_date INTEGER,

    -- Weighting
    importance REAL NOT NULL DEFAULT 0.7,
    confidence REAL NOT NULL DEFAULT 1.0,

    -- Lifetime (unix seconds; NULL expires_at = never)
    decay_class TEXT NOT NULL DEFAULT 'stable',
    expires_at INTEGER,
    last_confirmed_at INTEGER,

    -- Access counters
    recall_count INTEGER NOT NULL DEFAULT 0,
    last_accessed INTEGER,

    -- Bi-temporal validity and supersession
    valid_from INTEGER NOT NULL,
    valid_until INTEGER,
    supersedes_id TEXT,
    superseded_at INTEGER,
    superseded_by TEXT,

    -- Placement
    tier TEXT NOT NULL DEFAULT 'warm',
    scope TEXT NOT NULL DEFAULT 'global',
    scope_target TEXT,

    normalized_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_facts_entity_key ON facts(entity, key);
CREATE INDEX IF NOT EXISTS idx_facts_expires ON facts(expires_at);
CREATE INDEX IF NOT EXISTS idx_facts_superseded ON facts(superseded_at);
CREATE INDEX IF NOT EXISTS idx_facts_hash ON facts(normalized_hash);
CREATE INDEX IF NOT EXISTS idx_facts_tier ON facts(tier);
CREATE INDEX IF NOT EXISTS idx_facts_scope ON facts(scope, scope_target);
CREATE INDEX IF NOT EXISTS idx_facts_accessed ON facts(last_accessed);

-- FTS5 virtual table mirroring the searchable columns
CREATE VIRTUAL TABLE IF NOT EXISTS facts_fts USING fts5(
    id, text, category, entity, key, value,
    content='facts',
    content_rowid='rowid'
);

-- Triggers keep the FTS index an exact reflection of the base table
CREATE TRIGGER IF NOT EXISTS facts_ai AFTER INSERT ON facts BEGIN
    INSERT INTO facts_fts(rowid, id, text, category, entity, key, value)
    VALUES (NEW.rowid, NEW.id, NEW.text, NEW.category, NEW.entity, NEW.key, NEW.value);
END;

CREATE TRIGGER IF NOT EXISTS facts_ad AFTER DELETE ON facts BEGIN
    INSERT INTO facts_fts(facts_fts, rowid, id, text, category, entity, key, value)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.text, OLD.category, OLD.entity, OLD.key, OLD.value);
END;

CREATE TRIGGER IF NOT EXISTS facts_au AFTER UPDATE ON facts BEGIN
    INSERT INTO facts_fts(facts_fts, rowid, id, text, category, entity, key, value)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.text, OLD.category, OLD.entity, OLD.key, OLD.value);
    INSERT INTO facts_fts(rowid, id, text, category, entity, key, value)
    VALUES (NEW.rowid, NEW.id, NEW.text, NEW.category, NEW.entity, NEW.key, NEW.value);
END;

-- Typed edges between facts; cascade with either endpoint
CREATE TABLE IF NOT EXISTS memory_links (
    from_id TEXT NOT NULL REFERENCES facts(id) ON DELETE CASCADE,
    to_id TEXT NOT NULL REFERENCES facts(id) ON DELETE CASCADE,
    link_type TEXT NOT NULL,
    strength REAL NOT NULL DEFAULT 0.1,
    created_at INTEGER NOT NULL,
    last_strengthened INTEGER NOT NULL,
    PRIMARY KEY (from_id, to_id, link_type)
);

CREATE INDEX IF NOT EXISTS idx_links_from ON memory_links(from_id);
CREATE INDEX IF NOT EXISTS idx_links_to ON memory_links(to_id);

-- Procedures: reusable recipes with outcome tracking
CREATE TABLE IF NOT EXISTS procedures (
    id TEXT PRIMARY KEY,
    task_pattern TEXT NOT NULL,
    recipe_json TEXT NOT NULL,
    procedure_type TEXT NOT NULL DEFAULT 'positive',

    success_count INTEGER NOT NULL DEFAULT 0,
    failure_count INTEGER NOT NULL DEFAULT 0,
    last_validated INTEGER,
    last_failed INTEGER,
    confidence REAL NOT NULL DEFAULT 0.5,

    ttl_days INTEGER NOT NULL DEFAULT 30,

    scope TEXT NOT NULL DEFAULT 'global',
    scope_target TEXT,
    source_sessions TEXT NOT NULL DEFAULT '[]',
    evidence_sessions TEXT NOT NULL DEFAULT '[]',

    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_procedures_type ON procedures(procedure_type);
CREATE INDEX IF NOT EXISTS idx_procedures_validated ON procedures(last_validated);

CREATE VIRTUAL TABLE IF NOT EXISTS procedures_fts USING fts5(
    id, task_pattern,
    content='procedures',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS procedures_ai AFTER INSERT ON procedures BEGIN
    INSERT INTO procedures_fts(rowid, id, task_pattern)
    VALUES (NEW.rowid, NEW.id, NEW.task_pattern);
END;

CREATE TRIGGER IF NOT EXISTS procedures_ad AFTER DELETE ON procedures BEGIN
    INSERT INTO procedures_fts(procedures_fts, rowid, id, task_pattern)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.task_pattern);
END;

CREATE TRIGGER IF NOT EXISTS procedures_au AFTER UPDATE ON procedures BEGIN
    INSERT INTO procedures_fts(procedures_fts, rowid, id, task_pattern)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.task_pattern);
    INSERT INTO procedures_fts(rowid, id, task_pattern)
    VALUES (NEW.rowid, NEW.id, NEW.task_pattern);
END;

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Reinforcement quote queues (columns added via the probe-gated list)
const MIGRATION_V2_UP: &str = r#"
UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// V3: Skill promotion metadata (columns added via the probe-gated list)
const MIGRATION_V3_UP: &str = r#"
UPDATE schema_version SET version = 3, applied_at = datetime('now');
"#;

/// V4: Porter tokenizer upgrade for stemmed keyword recall.
/// Drops and rebuilds both FTS tables; base rows are untouched.
const MIGRATION_V4_UP: &str = r#"
DROP TRIGGER IF EXISTS facts_ai;
DROP TRIGGER IF EXISTS facts_ad;
DROP TRIGGER IF EXISTS facts_au;
DROP TABLE IF EXISTS facts_fts;

CREATE VIRTUAL TABLE facts_fts USING fts5(
    id, text, category, entity, key, value,
    content='facts',
    content_rowid='rowid',
    tokenize='porter unicode61'
);

INSERT INTO facts_fts(facts_fts) VALUES('rebuild');

CREATE TRIGGER facts_ai AFTER INSERT ON facts BEGIN
    INSERT INTO facts_fts(rowid, id, text, category, entity, key, value)
    VALUES (NEW.rowid, NEW.id, NEW.text, NEW.category, NEW.entity, NEW.key, NEW.value);
END;

CREATE TRIGGER facts_ad AFTER DELETE ON facts BEGIN
    INSERT INTO facts_fts(facts_fts, rowid, id, text, category, entity, key, value)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.text, OLD.category, OLD.entity, OLD.key, OLD.value);
END;

CREATE TRIGGER facts_au AFTER UPDATE ON facts BEGIN
    INSERT INTO facts_fts(facts_fts, rowid, id, text, category, entity, key, value)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.text, OLD.category, OLD.entity, OLD.key, OLD.value);
    INSERT INTO facts_fts(rowid, id, text, category, entity, key, value)
    VALUES (NEW.rowid, NEW.id, NEW.text, NEW.category, NEW.entity, NEW.key, NEW.value);
END;

DROP TRIGGER IF EXISTS procedures_ai;
DROP TRIGGER IF EXISTS procedures_ad;
DROP TRIGGER IF EXISTS procedures_au;
DROP TABLE IF EXISTS procedures_fts;

CREATE VIRTUAL TABLE procedures_fts USING fts5(
    id, task_pattern,
    content='procedures',
    content_rowid='rowid',
    tokenize='porter unicode61'
);

INSERT INTO procedures_fts(procedures_fts) VALUES('rebuild');

CREATE TRIGGER procedures_ai AFTER INSERT ON procedures BEGIN
    INSERT INTO procedures_fts(rowid, id, task_pattern)
    VALUES (NEW.rowid, NEW.id, NEW.task_pattern);
END;

CREATE TRIGGER procedures_ad AFTER DELETE ON procedures BEGIN
    INSERT INTO procedures_fts(procedures_fts, rowid, id, task_pattern)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.task_pattern);
END;

CREATE TRIGGER procedures_au AFTER UPDATE ON procedures BEGIN
    INSERT INTO procedures_fts(procedures_fts, rowid, id, task_pattern)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.task_pattern);
    INSERT INTO procedures_fts(rowid, id, task_pattern)
    VALUES (NEW.rowid, NEW.id, NEW.task_pattern);
END;

UPDATE schema_version SET version = 4, applied_at = datetime('now');
"#;

/// Additive columns applied after the versioned batches. Each is gated by a
/// `PRAGMA table_info` probe, so re-running against any schema vintage is a
/// no-op.
const ADDITIVE_COLUMNS: &[(&str, &str, &str)] = &[
    ("facts", "reinforced_count", "INTEGER NOT NULL DEFAULT 0"),
    ("facts", "last_reinforced_at", "INTEGER"),
    ("facts", "reinforced_quotes", "TEXT NOT NULL DEFAULT '[]'"),
    ("procedures", "reinforced_count", "INTEGER NOT NULL DEFAULT 0"),
    ("procedures", "last_reinforced_at", "INTEGER"),
    ("procedures", "reinforced_quotes", "TEXT NOT NULL DEFAULT '[]'"),
    ("procedures", "promoted_to_skill", "INTEGER NOT NULL DEFAULT 0"),
    ("procedures", "skill_path", "TEXT"),
    ("procedures", "promoted_at", "INTEGER"),
    ("procedures", "auto_publish", "INTEGER NOT NULL DEFAULT 0"),
    ("procedures", "notify", "INTEGER NOT NULL DEFAULT 0"),
];

/// Timestamps written by older builds were milliseconds. Anything past this
/// bound cannot be a plausible second count, so divide it down.
const MILLISECOND_BOUND: i64 = 10_000_000_000;

/// Get current schema version from database
pub fn get_current_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// True when `table` already carries `column`
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Apply pending migrations; returns the number of batches applied
pub fn apply_migrations(conn: &Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    for (table, column, decl) in ADDITIVE_COLUMNS {
        if !column_exists(conn, table, column)? {
            conn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} {};",
                table, column, decl
            ))?;
        }
    }

    fix_millisecond_timestamps(conn)?;

    Ok(applied)
}

/// One-shot repair of timestamps stored in milliseconds
fn fix_millisecond_timestamps(conn: &Connection) -> rusqlite::Result<()> {
    let fixed = conn.execute(
        "UPDATE facts SET
             created_at = CASE WHEN created_at > ?1 THEN created_at / 1000 ELSE created_at END,
             last_confirmed_at = CASE
                 WHEN last_confirmed_at > ?1 THEN last_confirmed_at / 1000
                 ELSE last_confirmed_at END
         WHERE created_at > ?1
            OR (last_confirmed_at IS NOT NULL AND last_confirmed_at > ?1)",
        [MILLISECOND_BOUND],
    )?;
    if fixed > 0 {
        tracing::info!("Repaired {} millisecond timestamps", fixed);
    }
    Ok(())
}
