//! Vector Store
//!
//! Approximate-nearest-neighbour lookup over fact embeddings, keyed by the
//! same id space as the relational store. Rows persist in a `memories`
//! table; the HNSW index (USearch) is rebuilt lazily on first use.
//!
//! Read failures degrade to empty results with a warning; write failures
//! propagate so the caller can keep its journal state consistent.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

// ============================================================================
// CONSTANTS
// ============================================================================

/// HNSW connectivity parameter (higher = better recall, more memory)
pub const DEFAULT_CONNECTIVITY: usize = 16;

/// HNSW expansion factor for index building
pub const DEFAULT_EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search
pub const DEFAULT_EXPANSION_SEARCH: usize = 64;

/// Minimum similarity kept by default
pub const DEFAULT_MIN_SCORE: f64 = 0.3;

/// Top-1 similarity treated as a duplicate
pub const DEFAULT_DUPLICATE_THRESHOLD: f64 = 0.95;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Vector store error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum VectorSearchError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Index error: {0}")]
    Index(String),
    #[error("Invalid dimensions: expected {expected}, got {got}")]
    InvalidDimensions { expected: usize, got: usize },
    #[error("Invalid id: {0}")]
    InvalidId(String),
}

pub type Result<T> = std::result::Result<T, VectorSearchError>;

// ============================================================================
// INPUT / OUTPUT
// ============================================================================

/// Row to upsert into the vector store
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// Fact id; the facade always passes the relational store's id
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub importance: f64,
    pub category: Option<String>,
}

/// A similarity hit: `score = 1 / (1 + distance)`
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub score: f64,
    pub text: String,
}

// ============================================================================
// VECTOR STORE
// ============================================================================

struct HnswState {
    index: Index,
    dimensions: usize,
    key_to_num: HashMap<String, u64>,
    num_to_key: HashMap<u64, String>,
    next_num: u64,
}

/// Persistent vector store with a lazily built in-memory HNSW index
pub struct VectorStore {
    conn: Mutex<Connection>,
    /// `None` until the first operation touches the index; built exactly
    /// once even under concurrent first calls (the mutex serializes them)
    hnsw: Mutex<Option<HnswState>>,
    path: PathBuf,
}

impl VectorStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;

             CREATE TABLE IF NOT EXISTS memories (
                 id TEXT PRIMARY KEY,
                 text TEXT NOT NULL,
                 vector BLOB NOT NULL,
                 importance REAL NOT NULL DEFAULT 0.7,
                 category TEXT,
                 created_at INTEGER NOT NULL
             );",
        )?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Ok(Self {
            conn: Mutex::new(conn),
            hnsw: Mutex::new(None),
            path,
        })
    }

    /// Upsert a row and mirror it into the index
    pub fn store(&self, record: &VectorRecord) -> Result<()> {
        validate_id(&record.id)?;
        if record.vector.is_empty() {
            return Err(VectorSearchError::InvalidDimensions {
                expected: 1,
                got: 0,
            });
        }

        {
            let conn = self.lock_conn()?;
            conn.execute(
                "INSERT INTO memories (id, text, vector, importance, category, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                     text = excluded.text,
                     vector = excluded.vector,
                     importance = excluded.importance,
                     category = excluded.category",
                params![
                    record.id,
                    record.text,
                    vector_to_bytes(&record.vector),
                    record.importance,
                    record.category,
                    Utc::now().timestamp(),
                ],
            )?;
        }

        let mut guard = self.lock_hnsw()?;
        if let Some(state) = guard.as_mut() {
            add_to_index(state, &record.id, &record.vector)?;
        }
        // Index not built yet: the row is on disk and will be picked up by
        // the lazy build on first search.
        Ok(())
    }

    /// Top-k by similarity, filtered by `min_score`. Returns empty on any
    /// internal failure - reads never take the caller down.
    pub fn search(&self, vector: &[f32], k: usize, min_score: f64) -> Vec<VectorHit> {
        match self.search_inner(vector, k, min_score) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("Vector search failed, returning empty: {}", e);
                vec![]
            }
        }
    }

    fn search_inner(&self, vector: &[f32], k: usize, min_score: f64) -> Result<Vec<VectorHit>> {
        let mut guard = self.lock_hnsw()?;
        let state = self.ensure_index(&mut guard)?;

        if vector.len() != state.dimensions {
            return Err(VectorSearchError::InvalidDimensions {
                expected: state.dimensions,
                got: vector.len(),
            });
        }

        let matches = state
            .index
            .search(vector, k)
            .map_err(|e| VectorSearchError::Index(e.to_string()))?;

        let mut ids_scores: Vec<(String, f64)> = Vec::with_capacity(matches.keys.len());
        for (num, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            let score = 1.0 / (1.0 + *distance as f64);
            if score < min_score {
                continue;
            }
            if let Some(id) = state.num_to_key.get(num) {
                ids_scores.push((id.clone(), score));
            }
        }
        drop(guard);

        let conn = self.lock_conn()?;
        let mut hits = Vec::with_capacity(ids_scores.len());
        for (id, score) in ids_scores {
            let text: Option<String> = conn
                .query_row("SELECT text FROM memories WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()?;
            if let Some(text) = text {
                hits.push(VectorHit { id, score, text });
            }
        }
        Ok(hits)
    }

    /// True when the nearest stored vector is at least `threshold` similar
    pub fn has_duplicate(&self, vector: &[f32], threshold: f64) -> bool {
        self.search(vector, 1, 0.0)
            .first()
            .map(|hit| hit.score >= threshold)
            .unwrap_or(false)
    }

    /// Remove a row. The id is validated before it reaches the deletion
    /// predicate.
    pub fn delete(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        {
            let conn = self.lock_conn()?;
            conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        }
        let mut guard = self.lock_hnsw()?;
        if let Some(state) = guard.as_mut() {
            if let Some(num) = state.key_to_num.remove(id) {
                state.num_to_key.remove(&num);
                state
                    .index
                    .remove(num)
                    .map_err(|e| VectorSearchError::Index(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Number of stored rows
    pub fn count(&self) -> Result<i64> {
        let conn = self.lock_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?)
    }

    /// Drop the in-memory index; the next operation rebuilds it
    pub fn close(&self) {
        if let Ok(mut guard) = self.hnsw.lock() {
            *guard = None;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| VectorSearchError::Index("connection lock poisoned".into()))
    }

    fn lock_hnsw(&self) -> Result<std::sync::MutexGuard<'_, Option<HnswState>>> {
        self.hnsw
            .lock()
            .map_err(|_| VectorSearchError::Index("index lock poisoned".into()))
    }

    /// Build the HNSW index from persisted rows if it does not exist yet
    fn ensure_index<'a>(
        &self,
        guard: &'a mut Option<HnswState>,
    ) -> Result<&'a mut HnswState> {
        if guard.is_none() {
            let rows: Vec<(String, Vec<u8>)> = {
                let conn = self.lock_conn()?;
                let mut stmt = conn.prepare("SELECT id, vector FROM memories")?;
                let collected = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .filter_map(|r| r.ok())
                    .collect();
                collected
            };

            let dimensions = rows
                .first()
                .map(|(_, bytes)| bytes.len() / 4)
                .unwrap_or(0);

            let mut state = new_hnsw_state(dimensions.max(1))?;
            state.dimensions = dimensions;
            for (id, bytes) in rows {
                let vector = vector_from_bytes(&bytes);
                if state.dimensions == 0 {
                    state.dimensions = vector.len();
                }
                if let Err(e) = add_to_index(&mut state, &id, &vector) {
                    tracing::warn!("Skipping vector row {} during index build: {}", id, e);
                }
            }
            *guard = Some(state);
        }
        Ok(guard.as_mut().expect("index built above"))
    }
}

fn new_hnsw_state(dimensions: usize) -> Result<HnswState> {
    let options = IndexOptions {
        dimensions,
        metric: MetricKind::Cos,
        quantization: ScalarKind::F32,
        connectivity: DEFAULT_CONNECTIVITY,
        expansion_add: DEFAULT_EXPANSION_ADD,
        expansion_search: DEFAULT_EXPANSION_SEARCH,
        multi: false,
    };
    let index = Index::new(&options).map_err(|e| VectorSearchError::Index(e.to_string()))?;
    Ok(HnswState {
        index,
        dimensions,
        key_to_num: HashMap::new(),
        num_to_key: HashMap::new(),
        next_num: 0,
    })
}

fn add_to_index(state: &mut HnswState, id: &str, vector: &[f32]) -> Result<()> {
    if state.dimensions == 0 {
        // Index was built over an empty table; size it to the first vector
        *state = new_hnsw_state(vector.len())?;
    }
    if vector.len() != state.dimensions {
        return Err(VectorSearchError::InvalidDimensions {
            expected: state.dimensions,
            got: vector.len(),
        });
    }

    let num = match state.key_to_num.get(id) {
        Some(&existing) => {
            state
                .index
                .remove(existing)
                .map_err(|e| VectorSearchError::Index(e.to_string()))?;
            existing
        }
        None => {
            let num = state.next_num;
            state.next_num += 1;
            state.key_to_num.insert(id.to_string(), num);
            state.num_to_key.insert(num, id.to_string());
            num
        }
    };

    state
        .index
        .reserve(state.index.size() + 1)
        .map_err(|e| VectorSearchError::Index(e.to_string()))?;
    state
        .index
        .add(num, vector)
        .map_err(|e| VectorSearchError::Index(e.to_string()))
}

/// Ids are 32-char lowercase hex (or hyphenated UUID). Anything else is
/// rejected before touching a predicate.
fn validate_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id.len() <= 36
        && id
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == '-');
    if ok {
        Ok(())
    } else {
        Err(VectorSearchError::InvalidId(id.to_string()))
    }
}

fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn vector_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            text: format!("text for {}", id),
            vector,
            importance: 0.7,
            category: None,
        }
    }

    fn hex_id(n: u8) -> String {
        format!("{:032x}", n)
    }

    #[test]
    fn test_store_and_search() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(dir.path().join("vectors.db")).unwrap();

        store.store(&record(&hex_id(1), vec![1.0, 0.0, 0.0])).unwrap();
        store.store(&record(&hex_id(2), vec![0.0, 1.0, 0.0])).unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0], 2, 0.0);
        assert_eq!(hits.first().map(|h| h.id.clone()), Some(hex_id(1)));
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_min_score_filters() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(dir.path().join("vectors.db")).unwrap();

        store.store(&record(&hex_id(1), vec![1.0, 0.0])).unwrap();
        store.store(&record(&hex_id(2), vec![-1.0, 0.0])).unwrap();

        // The opposite vector is maximally distant under cosine
        let hits = store.search(&[1.0, 0.0], 2, 0.9);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, hex_id(1));
    }

    #[test]
    fn test_has_duplicate() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(dir.path().join("vectors.db")).unwrap();

        store.store(&record(&hex_id(1), vec![0.6, 0.8])).unwrap();
        assert!(store.has_duplicate(&[0.6, 0.8], DEFAULT_DUPLICATE_THRESHOLD));
        assert!(!store.has_duplicate(&[-0.6, 0.8], DEFAULT_DUPLICATE_THRESHOLD));
    }

    #[test]
    fn test_delete_and_count() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(dir.path().join("vectors.db")).unwrap();

        store.store(&record(&hex_id(1), vec![1.0, 0.0])).unwrap();
        store.store(&record(&hex_id(2), vec![0.0, 1.0])).unwrap();
        assert_eq!(store.count().unwrap(), 2);

        store.delete(&hex_id(1)).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        let hits = store.search(&[1.0, 0.0], 2, 0.0);
        assert!(hits.iter().all(|h| h.id != hex_id(1)));
    }

    #[test]
    fn test_delete_rejects_malformed_id() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(dir.path().join("vectors.db")).unwrap();
        assert!(matches!(
            store.delete("1 OR 1=1"),
            Err(VectorSearchError::InvalidId(_))
        ));
    }

    #[test]
    fn test_lazy_rebuild_after_close() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(dir.path().join("vectors.db")).unwrap();
        store.store(&record(&hex_id(7), vec![1.0, 0.0])).unwrap();

        store.close();
        // Next search rebuilds the index from the persisted rows
        let hits = store.search(&[1.0, 0.0], 1, 0.0);
        assert_eq!(hits.first().map(|h| h.id.clone()), Some(hex_id(7)));
    }

    #[test]
    fn test_upsert_replaces_vector() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(dir.path().join("vectors.db")).unwrap();

        store.store(&record(&hex_id(1), vec![1.0, 0.0])).unwrap();
        store.store(&record(&hex_id(1), vec![0.0, 1.0])).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        let hits = store.search(&[0.0, 1.0], 1, 0.0);
        assert_eq!(hits[0].id, hex_id(1));
        assert!(hits[0].score > 0.99);
    }

    #[test]
    fn test_vector_bytes_roundtrip() {
        let v = vec![0.25_f32, -1.5, 3.0];
        assert_eq!(vector_from_bytes(&vector_to_bytes(&v)), v);
    }
}
