//! Relational Fact Store
//!
//! Durable, transactional storage of facts with a porter-stemmed full-text
//! index, bi-temporal supersession, access-refresh TTLs, and scope
//! isolation. Separate reader/writer connections give interior mutability:
//! all methods take `&self`, so callers can share the store behind an `Arc`.

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use uuid::Uuid;

use crate::decay::{expiry_for, ttl_for, DecayClassifier, LanguageResources};
use crate::memory::{
    DecayClass, Fact, FactInput, IdPrefixMatch, MemoryStats, QueryOptions, Scope, Tier,
    DEFAULT_CONFIDENCE, DEFAULT_IMPORTANCE,
};
use crate::search::build_match_query;
use crate::tagger::{extract_tags, normalized_hash, serialize_tags, tag_needle};

use super::migrations;
use super::scope::scope_condition;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Scope/target combination rejected
    #[error("Invalid scope: {0}")]
    InvalidScope(String),
    /// Malformed caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// CONFIG
// ============================================================================

/// Store configuration
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Return the existing row instead of inserting when the normalized
    /// hash already exists
    pub fuzzy_dedup: bool,
    /// Decay-signal sets; English is always merged in
    pub language: Option<LanguageResources>,
}

/// Lifetime of the superseded-texts cache
const SUPERSEDED_CACHE_TTL_SECS: u64 = 5 * 60;

/// Batch bound for access refreshes
const REFRESH_BATCH: usize = 500;

/// Confidence never decays below this floor
const CONFIDENCE_FLOOR: f64 = 0.1;

struct SupersededCache {
    built_at: Instant,
    texts: HashSet<String>,
}

// ============================================================================
// STORE
// ============================================================================

/// SQLite-backed fact store
pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    classifier: DecayClassifier,
    superseded_cache: Mutex<Option<SupersededCache>>,
    fuzzy_dedup: bool,
    path: PathBuf,
}

impl Store {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA wal_autocheckpoint = 1000;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(())
    }

    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(0o700);
                let _ = std::fs::set_permissions(parent, perms);
            }
        }

        let writer_conn = Connection::open(&path)?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::configure_connection(&writer_conn)?;
        migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        let language = config.language.unwrap_or_default();

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            classifier: DecayClassifier::new(&language),
            superseded_cache: Mutex::new(None),
            fuzzy_dedup: config.fuzzy_dedup,
            path,
        })
    }

    /// Replace both connections, re-applying pragmas. Used after an external
    /// close (restart signal); existing handles are dropped.
    pub fn reopen(&self) -> Result<()> {
        let writer_conn = Connection::open(&self.path)?;
        Self::configure_connection(&writer_conn)?;
        let reader_conn = Connection::open(&self.path)?;
        Self::configure_connection(&reader_conn)?;

        *self.lock_writer()? = writer_conn;
        *self.lock_reader()? = reader_conn;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StoreError::Init("Writer lock poisoned".into()))
    }

    pub(crate) fn lock_reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StoreError::Init("Reader lock poisoned".into()))
    }

    // ========================================================================
    // WRITE PATH
    // ========================================================================

    /// Store a fact. Resolves the decay class, derives tags and the dedup
    /// hash, validates scope, and inserts in one statement. With fuzzy dedup
    /// enabled, an existing row with the same normalized hash is returned
    /// unchanged instead.
    pub fn store(&self, input: FactInput) -> Result<Fact> {
        self.store_with_id(&new_fact_id(), input)
    }

    /// Store under a caller-chosen id. The journaled write path assigns the
    /// id before appending to the journal so replays stay idempotent.
    pub fn store_with_id(&self, id: &str, input: FactInput) -> Result<Fact> {
        if input.text.trim().is_empty() {
            return Err(StoreError::InvalidInput("fact text cannot be empty".into()));
        }

        let scope = input.scope.unwrap_or_default();
        validate_scope(scope, input.scope_target.as_deref())?;

        let now = Utc::now();
        let hash = normalized_hash(&input.text);

        if self.fuzzy_dedup {
            let existing: Option<String> = {
                let reader = self.lock_reader()?;
                reader
                    .query_row(
                        "SELECT id FROM facts
                         WHERE normalized_hash = ?1 AND superseded_at IS NULL
                         LIMIT 1",
                        params![hash],
                        |row| row.get(0),
                    )
                    .optional()?
            };
            if let Some(id) = existing {
                tracing::debug!("Fuzzy dedup hit for {}", id);
                return self
                    .get_by_id(&id)?
                    .ok_or_else(|| StoreError::NotFound(id));
            }
        }

        let decay_class = input.decay_class.unwrap_or_else(|| {
            self.classifier.classify(
                input.entity.as_deref(),
                input.key.as_deref(),
                input.value.as_deref(),
                &input.text,
            )
        });
        let expires_at = expiry_for(decay_class, now);

        let tags = if input.tags.is_empty() {
            extract_tags(&input.text, input.entity.as_deref())
        } else {
            input.tags.iter().map(|t| t.to_lowercase()).collect()
        };

        let valid_from = input
            .valid_from
            .or(input.source_date)
            .unwrap_or(now);

        {
            let writer = self.lock_writer()?;
            writer.execute(
                "INSERT INTO facts (
                    id, text, entity, key, value, category, summary, tags,
                    source, source_sessions, source_date,
                    importance, confidence,
                    decay_class, expires_at, last_confirmed_at,
                    recall_count, last_accessed,
                    reinforced_count, last_reinforced_at, reinforced_quotes,
                    valid_from, valid_until, supersedes_id, superseded_at, superseded_by,
                    tier, scope, scope_target,
                    normalized_hash, created_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                    ?9, ?10, ?11,
                    ?12, ?13,
                    ?14, ?15, ?16,
                    0, NULL,
                    0, NULL, '[]',
                    ?17, NULL, ?18, NULL, NULL,
                    ?19, ?20, ?21,
                    ?22, ?23
                )",
                params![
                    id,
                    input.text,
                    input.entity,
                    input.key,
                    input.value,
                    input.category,
                    input.summary,
                    serialize_tags(&tags),
                    input.source,
                    serde_json::to_string(&input.source_sessions)
                        .unwrap_or_else(|_| "[]".into()),
                    input.source_date.map(|t| t.timestamp()),
                    input.importance.unwrap_or(DEFAULT_IMPORTANCE).clamp(0.0, 1.0),
                    input.confidence.unwrap_or(DEFAULT_CONFIDENCE).clamp(0.0, 1.0),
                    decay_class.as_str(),
                    expires_at.map(|t| t.timestamp()),
                    now.timestamp(),
                    valid_from.timestamp(),
                    input.supersedes_id,
                    input.tier.unwrap_or_default().as_str(),
                    scope.as_str(),
                    input.scope_target,
                    hash,
                    now.timestamp(),
                ],
            )?;
        }

        self.get_by_id(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Mark `old_id` as superseded. When the successor exists, the validity
    /// boundary is its `valid_from`, so predecessor and successor tile time
    /// exactly; otherwise the boundary is now. Already-superseded rows are
    /// left untouched (returns false).
    pub fn supersede(&self, old_id: &str, new_id: Option<&str>) -> Result<bool> {
        let boundary = match new_id {
            Some(id) => self
                .get_by_id(id)?
                .map(|f| f.valid_from)
                .unwrap_or_else(Utc::now),
            None => Utc::now(),
        };

        let changed = {
            let mut writer = self.lock_writer()?;
            let tx = writer.transaction()?;
            let changed = tx.execute(
                "UPDATE facts SET superseded_at = ?1, superseded_by = ?2, valid_until = ?3
                 WHERE id = ?4 AND superseded_at IS NULL",
                params![
                    Utc::now().timestamp(),
                    new_id,
                    boundary.timestamp(),
                    old_id
                ],
            )?;

            if changed > 0 {
                if let Some(new_id) = new_id {
                    tx.execute(
                        "UPDATE facts SET supersedes_id = ?1
                         WHERE id = ?2 AND supersedes_id IS NULL",
                        params![old_id, new_id],
                    )?;
                }
            }
            tx.commit()?;
            changed > 0
        };

        if changed {
            self.invalidate_superseded_cache();
        }
        Ok(changed)
    }

    /// Within one transaction, in batches of at most 500 ids: bump access
    /// counters and extend the TTL of stable/active facts from now.
    pub fn refresh_accessed(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let now = Utc::now();

        let mut writer = self.lock_writer()?;
        let tx = writer.transaction()?;
        for batch in ids.chunks(REFRESH_BATCH) {
            let placeholders = vec!["?"; batch.len()].join(", ");

            tx.execute(
                &format!(
                    "UPDATE facts SET last_accessed = {}, recall_count = recall_count + 1
                     WHERE id IN ({})",
                    now.timestamp(),
                    placeholders
                ),
                params_from_iter(batch.iter()),
            )?;

            for class in [DecayClass::Stable, DecayClass::Active] {
                if let Some(ttl) = ttl_for(class) {
                    tx.execute(
                        &format!(
                            "UPDATE facts SET expires_at = {}
                             WHERE decay_class = '{}' AND id IN ({})",
                            (now + ttl).timestamp(),
                            class.as_str(),
                            placeholders
                        ),
                        params_from_iter(batch.iter()),
                    )?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Append a praise snippet and bump the reinforcement counter. Quotes
    /// are truncated to 200 chars and only the last 10 are kept.
    pub fn reinforce_fact(&self, id: &str, quote: &str) -> Result<Fact> {
        let fact = self
            .get_by_id(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut quotes = fact.reinforced_quotes;
        quotes.push(quote.chars().take(200).collect());
        let start = quotes.len().saturating_sub(10);
        let quotes = &quotes[start..];

        {
            let writer = self.lock_writer()?;
            writer.execute(
                "UPDATE facts SET reinforced_count = reinforced_count + 1,
                     last_reinforced_at = ?1, reinforced_quotes = ?2
                 WHERE id = ?3",
                params![
                    Utc::now().timestamp(),
                    serde_json::to_string(quotes).unwrap_or_else(|_| "[]".into()),
                    id
                ],
            )?;
        }

        self.get_by_id(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Confirm a fact is still true: restore confidence, stamp the
    /// confirmation, and refresh its TTL.
    pub fn confirm(&self, id: &str) -> Result<Fact> {
        let fact = self
            .get_by_id(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let now = Utc::now();
        let expires = expiry_for(fact.decay_class, now);

        {
            let writer = self.lock_writer()?;
            writer.execute(
                "UPDATE facts SET confidence = 1.0, last_confirmed_at = ?1, expires_at = ?2
                 WHERE id = ?3",
                params![now.timestamp(), expires.map(|t| t.timestamp()), id],
            )?;
        }

        self.get_by_id(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Delete a fact; links cascade. Returns true when a row was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let deleted = {
            let writer = self.lock_writer()?;
            writer.execute("DELETE FROM facts WHERE id = ?1", params![id])?
        };
        if deleted > 0 {
            self.invalidate_superseded_cache();
        }
        Ok(deleted > 0)
    }

    /// Remove every expired row; returns the count
    pub fn prune_expired(&self) -> Result<usize> {
        let writer = self.lock_writer()?;
        let removed = writer.execute(
            "DELETE FROM facts WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![Utc::now().timestamp()],
        )?;
        Ok(removed)
    }

    /// Multiply the confidence of unconfirmed facts by `factor`, flooring
    /// at 0.1. Permanent facts are exempt. Returns the affected count.
    pub fn decay_confidence(&self, older_than_days: i64, factor: f64) -> Result<usize> {
        let cutoff = (Utc::now() - Duration::days(older_than_days)).timestamp();
        let writer = self.lock_writer()?;
        let changed = writer.execute(
            "UPDATE facts SET confidence = MAX(?1, confidence * ?2)
             WHERE COALESCE(last_confirmed_at, created_at) < ?3
               AND decay_class != 'permanent'
               AND superseded_at IS NULL",
            params![CONFIDENCE_FLOOR, factor, cutoff],
        )?;
        Ok(changed)
    }

    /// Move a fact between tiers
    pub fn set_tier(&self, id: &str, tier: Tier) -> Result<()> {
        let writer = self.lock_writer()?;
        let changed = writer.execute(
            "UPDATE facts SET tier = ?1 WHERE id = ?2",
            params![tier.as_str(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    // ========================================================================
    // READ PATH
    // ========================================================================

    /// Get a fact by id
    pub fn get_by_id(&self, id: &str) -> Result<Option<Fact>> {
        let reader = self.lock_reader()?;
        let fact = reader
            .query_row("SELECT * FROM facts WHERE id = ?1", params![id], |row| {
                row_to_fact(row)
            })
            .optional()?;
        Ok(fact)
    }

    /// Resolve a short id prefix. Prefixes below 4 hex chars never match;
    /// ambiguity reports at most three candidates.
    pub fn find_by_id_prefix(&self, prefix: &str) -> Result<IdPrefixMatch> {
        let prefix = prefix.to_lowercase();
        if prefix.len() < 4 || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(IdPrefixMatch::None);
        }

        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare("SELECT id FROM facts WHERE id LIKE ?1 LIMIT 4")?;
        let ids: Vec<String> = stmt
            .query_map(params![format!("{}%", prefix)], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(match ids.len() {
            0 => IdPrefixMatch::None,
            1 => IdPrefixMatch::Unique {
                id: ids.into_iter().next().expect("one id"),
            },
            n => IdPrefixMatch::Ambiguous {
                count: n.min(3),
                sample: ids.into_iter().take(3).collect(),
            },
        })
    }

    /// Full-text search. Returns candidates with their raw BM25 rank
    /// (lower = better), capped at `limit`, after expiry/supersession/
    /// temporal/tag/tier/scope filtering. An empty sanitized query yields
    /// an empty result.
    pub fn search(&self, query: &str, limit: usize, opts: &QueryOptions) -> Result<Vec<(Fact, f64)>> {
        let Some(match_query) = build_match_query(query) else {
            return Ok(vec![]);
        };

        let mut sql = String::from(
            "SELECT f.*, bm25(facts_fts) AS rank
             FROM facts f JOIN facts_fts ON f.id = facts_fts.id
             WHERE facts_fts MATCH ?",
        );
        let mut values: Vec<Value> = vec![Value::Text(match_query)];
        push_visibility_filters(&mut sql, &mut values, opts);

        sql.push_str(" ORDER BY rank LIMIT ?");
        values.push(Value::Integer(limit as i64));

        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                let fact = row_to_fact(row)?;
                let rank: f64 = row.get("rank")?;
                Ok((fact, rank))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Case-insensitive exact lookup on entity (and optionally key),
    /// ordered by confidence then recency of the source statement.
    pub fn lookup(
        &self,
        entity: &str,
        key: Option<&str>,
        opts: &QueryOptions,
    ) -> Result<Vec<Fact>> {
        let mut sql = String::from("SELECT f.* FROM facts f WHERE LOWER(f.entity) = LOWER(?)");
        let mut values: Vec<Value> = vec![Value::Text(entity.to_string())];

        if let Some(key) = key {
            sql.push_str(" AND LOWER(f.key) = LOWER(?)");
            values.push(Value::Text(key.to_string()));
        }
        push_visibility_filters(&mut sql, &mut values, opts);
        sql.push_str(" ORDER BY f.confidence DESC, COALESCE(f.source_date, f.created_at) DESC");

        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), row_to_fact)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Paged listing, newest first
    pub fn list(&self, limit: usize, offset: usize) -> Result<Vec<Fact>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM facts ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], row_to_fact)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every fact passing the standard visibility filters
    pub fn get_all(&self, opts: &QueryOptions) -> Result<Vec<Fact>> {
        let mut sql = String::from("SELECT f.* FROM facts f WHERE 1=1");
        let mut values: Vec<Value> = vec![];
        push_visibility_filters(&mut sql, &mut values, opts);
        sql.push_str(" ORDER BY f.created_at DESC");

        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), row_to_fact)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Lowercase texts of superseded facts, cached for five minutes.
    /// Vector results matching one of these are filtered out post-hoc.
    pub fn superseded_texts(&self) -> Result<HashSet<String>> {
        {
            let cache = self
                .superseded_cache
                .lock()
                .map_err(|_| StoreError::Init("Cache lock poisoned".into()))?;
            if let Some(entry) = cache.as_ref() {
                if entry.built_at.elapsed().as_secs() < SUPERSEDED_CACHE_TTL_SECS {
                    return Ok(entry.texts.clone());
                }
            }
        }

        let texts: HashSet<String> = {
            let reader = self.lock_reader()?;
            let mut stmt =
                reader.prepare("SELECT LOWER(text) FROM facts WHERE superseded_at IS NOT NULL")?;
            let collected = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .filter_map(|r| r.ok())
                .collect();
            collected
        };

        let mut cache = self
            .superseded_cache
            .lock()
            .map_err(|_| StoreError::Init("Cache lock poisoned".into()))?;
        *cache = Some(SupersededCache {
            built_at: Instant::now(),
            texts: texts.clone(),
        });
        Ok(texts)
    }

    pub(crate) fn invalidate_superseded_cache(&self) {
        if let Ok(mut cache) = self.superseded_cache.lock() {
            *cache = None;
        }
    }

    // ========================================================================
    // TELEMETRY & MAINTENANCE
    // ========================================================================

    /// Aggregate counts and the stored-token estimate
    pub fn stats(&self) -> Result<MemoryStats> {
        let reader = self.lock_reader()?;
        let now = Utc::now().timestamp();

        let total_facts: i64 =
            reader.query_row("SELECT COUNT(*) FROM facts", [], |row| row.get(0))?;
        let superseded_facts: i64 = reader.query_row(
            "SELECT COUNT(*) FROM facts WHERE superseded_at IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        let expired_facts: i64 = reader.query_row(
            "SELECT COUNT(*) FROM facts WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now],
            |row| row.get(0),
        )?;
        let total_procedures: i64 =
            reader.query_row("SELECT COUNT(*) FROM procedures", [], |row| row.get(0))?;
        let total_links: i64 =
            reader.query_row("SELECT COUNT(*) FROM memory_links", [], |row| row.get(0))?;

        let group_counts = |sql: &str| -> Result<Vec<(String, i64)>> {
            let mut stmt = reader.prepare(sql)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        };

        let by_decay_class =
            group_counts("SELECT decay_class, COUNT(*) FROM facts GROUP BY decay_class")?;
        let by_tier = group_counts("SELECT tier, COUNT(*) FROM facts GROUP BY tier")?;
        let by_scope = group_counts("SELECT scope, COUNT(*) FROM facts GROUP BY scope")?;

        let estimated_stored_tokens: i64 = reader.query_row(
            "SELECT COALESCE(SUM((LENGTH(COALESCE(summary, text)) + 3) / 4), 0)
             FROM facts
             WHERE superseded_at IS NULL
               AND (expires_at IS NULL OR expires_at > ?1)",
            params![now],
            |row| row.get(0),
        )?;

        Ok(MemoryStats {
            total_facts,
            superseded_facts,
            expired_facts,
            total_procedures,
            total_links,
            by_decay_class,
            by_tier,
            by_scope,
            estimated_stored_tokens,
        })
    }

    /// Online backup to another file
    pub fn backup_to(&self, dest: &Path) -> Result<()> {
        let reader = self.lock_reader()?;
        let mut dst = Connection::open(dest)?;
        let backup = rusqlite::backup::Backup::new(&reader, &mut dst)?;
        backup.run_to_completion(100, std::time::Duration::from_millis(10), None)?;
        Ok(())
    }
}

// ============================================================================
// ROW MAPPING & FILTERS
// ============================================================================

/// Fresh fact id: UUID v4 as 32 lowercase hex chars
pub fn new_fact_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn validate_scope(scope: Scope, target: Option<&str>) -> Result<()> {
    match (scope, target) {
        (Scope::Global, Some(_)) => Err(StoreError::InvalidScope(
            "global scope takes no target".into(),
        )),
        (Scope::Global, None) => Ok(()),
        (_, Some(t)) if !t.is_empty() => Ok(()),
        (scope, _) => Err(StoreError::InvalidScope(format!(
            "{} scope requires a target",
            scope
        ))),
    }
}

/// JSON column decode that downgrades corruption to an info log
pub(crate) fn parse_or_default<T: serde::de::DeserializeOwned + Default>(
    raw: &str,
    what: &str,
) -> T {
    match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::info!("Corrupt {} column, substituting default: {}", what, e);
            T::default()
        }
    }
}

fn ts(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap_or_else(Utc::now)
}

fn ts_opt(seconds: Option<i64>) -> Option<DateTime<Utc>> {
    seconds.and_then(|s| DateTime::from_timestamp(s, 0))
}

/// Convert a row to a Fact
pub(crate) fn row_to_fact(row: &rusqlite::Row) -> rusqlite::Result<Fact> {
    let tags_raw: String = row.get("tags")?;
    let source_sessions_raw: String = row.get("source_sessions")?;
    let quotes_raw: String = row.get("reinforced_quotes")?;

    let decay_class: String = row.get("decay_class")?;
    let tier: String = row.get("tier")?;
    let scope: String = row.get("scope")?;

    Ok(Fact {
        id: row.get("id")?,
        text: row.get("text")?,
        entity: row.get("entity")?,
        key: row.get("key")?,
        value: row.get("value")?,
        category: row.get("category")?,
        summary: row.get("summary")?,
        tags: crate::tagger::deserialize_tags(&tags_raw),
        source: row.get("source")?,
        source_sessions: parse_or_default(&source_sessions_raw, "source_sessions"),
        source_date: ts_opt(row.get("source_date")?),
        importance: row.get("importance")?,
        confidence: row.get("confidence")?,
        decay_class: DecayClass::parse_name(&decay_class),
        expires_at: ts_opt(row.get("expires_at")?),
        last_confirmed_at: ts_opt(row.get("last_confirmed_at")?),
        recall_count: row.get("recall_count")?,
        last_accessed: ts_opt(row.get("last_accessed")?),
        reinforced_count: row.get("reinforced_count")?,
        last_reinforced_at: ts_opt(row.get("last_reinforced_at")?),
        reinforced_quotes: parse_or_default(&quotes_raw, "reinforced_quotes"),
        valid_from: ts(row.get("valid_from")?),
        valid_until: ts_opt(row.get("valid_until")?),
        supersedes_id: row.get("supersedes_id")?,
        superseded_at: ts_opt(row.get("superseded_at")?),
        superseded_by: row.get("superseded_by")?,
        tier: Tier::parse_name(&tier),
        scope: Scope::parse_name(&scope),
        scope_target: row.get("scope_target")?,
        normalized_hash: row.get("normalized_hash")?,
        created_at: ts(row.get("created_at")?),
    })
}

/// Append expiry, temporal, supersession, tag, tier, and scope clauses.
/// Point-in-time queries replace the supersession/expiry pair with a
/// validity-window check.
pub(crate) fn push_visibility_filters(
    sql: &mut String,
    values: &mut Vec<Value>,
    opts: &QueryOptions,
) {
    let now = Utc::now().timestamp();

    match opts.as_of {
        Some(at) => {
            sql.push_str(" AND f.valid_from <= ? AND (f.valid_until IS NULL OR f.valid_until > ?)");
            values.push(Value::Integer(at.timestamp()));
            values.push(Value::Integer(at.timestamp()));
        }
        None => {
            if !opts.include_superseded {
                sql.push_str(" AND f.superseded_at IS NULL");
            }
            sql.push_str(" AND (f.expires_at IS NULL OR f.expires_at > ?)");
            values.push(Value::Integer(now));
        }
    }

    if let Some(tag) = &opts.tag {
        sql.push_str(" AND f.tags LIKE ?");
        values.push(Value::Text(tag_needle(tag)));
    }

    if !opts.include_cold {
        sql.push_str(" AND f.tier != 'cold'");
    }

    let (scope_sql, scope_values) = scope_condition(&opts.scope, "f");
    sql.push_str(&scope_sql);
    values.extend(scope_values);
}

// ============================================================================
// TESTS
// ============================================================================
