//! Memory Facade
//!
//! The coordinating API over the relational store, the vector index, and
//! the write-ahead journal. This is the only module that touches more than
//! one of them, and it owns the cross-store invariants:
//!
//! - Writes journal first, commit to the relational store, mirror into the
//!   vector index, then tombstone the journal entry.
//! - On open, surviving journal entries are replayed idempotently.
//! - Search fans out to both indexes, merges by id with the relational row
//!   as the authoritative view, filters vector hits against the
//!   superseded-texts cache, and ranks by composite salience.

use chrono::Utc;
use lru::LruCache;
use serde_json::json;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::memory::{
    Fact, FactInput, MatchKind, MemoryStats, QueryOptions, ScopeFilter, SearchHit,
};
use crate::providers::{Chat, ChatOptions, ChatRouter, Embedder, ProviderError};
use crate::search::{bm25_normalize, fact_lookup_score, fact_search_score, FactSignals, RankerConfig};
use crate::storage::{Store, StoreConfig, StoreError};
use crate::wal::{WalEntry, WalError, WalOperation, WriteAheadLog, DEFAULT_MAX_ENTRY_AGE};

#[cfg(feature = "vector-search")]
use crate::search::{VectorRecord, VectorStore, DEFAULT_MIN_SCORE};

mod classify;

pub use classify::{Classification, WriteDecision};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Facade error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Wal(#[from] WalError),
    #[cfg(feature = "vector-search")]
    #[error(transparent)]
    Vector(#[from] crate::search::VectorSearchError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub type Result<T> = std::result::Result<T, MemoryError>;

// ============================================================================
// CONFIG
// ============================================================================

/// Engine configuration. Paths are collaborator-provided and treated as
/// opaque.
pub struct MemoryConfig {
    /// Relational database file
    pub db_path: PathBuf,
    /// Journal file
    pub wal_path: PathBuf,
    /// Vector database file; absent disables the vector index even when
    /// the feature is compiled in
    #[cfg(feature = "vector-search")]
    pub vector_path: Option<PathBuf>,
    /// Return existing rows on normalized-hash collisions
    pub fuzzy_dedup: bool,
    /// Decay-signal language resources
    pub language: Option<crate::decay::LanguageResources>,
    /// Ranking weights
    pub ranker: RankerConfig,
    /// Embedding provider
    pub embedder: Option<Arc<dyn Embedder>>,
    /// Classification model, with fallbacks in order
    pub chat: Option<Arc<dyn Chat>>,
    pub chat_models: Vec<String>,
}

impl MemoryConfig {
    /// Configuration rooted in the platform data directory
    pub fn at_default_location() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("io", "mnemo", "core").ok_or_else(|| {
            StoreError::Init("Could not determine project directories".to_string())
        })?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).map_err(StoreError::Io)?;
        Ok(Self::in_dir(data_dir))
    }

    /// Minimal configuration rooted in one directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            db_path: dir.join("memory.db"),
            wal_path: dir.join("memory.wal"),
            #[cfg(feature = "vector-search")]
            vector_path: Some(dir.join("vectors.db")),
            fuzzy_dedup: false,
            language: None,
            ranker: RankerConfig::default(),
            embedder: None,
            chat: None,
            chat_models: vec![],
        }
    }
}

/// Per-call search options
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Also query the vector index (requires an embedder)
    pub vector: bool,
    /// Minimum vector similarity kept
    pub min_score: Option<f64>,
    /// Row filters (scope, tags, tiers, temporal view)
    pub query: QueryOptions,
}

/// Outcome of a facade write
#[derive(Debug, Clone)]
pub struct StoreReceipt {
    pub fact: Fact,
    pub decision: WriteDecision,
}

/// Query-embedding cache capacity
const QUERY_CACHE_SIZE: usize = 100;

// ============================================================================
// MEMORY
// ============================================================================

/// The hybrid memory engine
pub struct Memory {
    store: Store,
    wal: WriteAheadLog,
    #[cfg(feature = "vector-search")]
    vectors: Option<VectorStore>,
    embedder: Option<Arc<dyn Embedder>>,
    chat: Option<ChatRouter>,
    ranker: RankerConfig,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
    /// Ids returned by the most recent search, for co-recall strengthening
    last_recalled: Mutex<Vec<String>>,
    config_warning_sent: AtomicBool,
}

impl Memory {
    /// Open the engine and replay any surviving journal entries
    pub fn open(config: MemoryConfig) -> Result<Self> {
        let store = Store::open(
            &config.db_path,
            StoreConfig {
                fuzzy_dedup: config.fuzzy_dedup,
                language: config.language,
            },
        )?;
        let wal = WriteAheadLog::new(&config.wal_path);

        #[cfg(feature = "vector-search")]
        let vectors = match &config.vector_path {
            Some(path) => Some(VectorStore::open(path)?),
            None => None,
        };

        let chat = config
            .chat
            .map(|chat| ChatRouter::new(chat, config.chat_models.clone()));

        let engine = Self {
            store,
            wal,
            #[cfg(feature = "vector-search")]
            vectors,
            embedder: config.embedder,
            chat,
            ranker: config.ranker,
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_SIZE).expect("cache size is non-zero"),
            )),
            last_recalled: Mutex::new(vec![]),
            config_warning_sent: AtomicBool::new(false),
        };

        engine.recover()?;
        Ok(engine)
    }

    /// Direct store access for maintenance operations (compaction, links,
    /// procedures, pruning). Reads are unrestricted; the journaled write
    /// path stays on the facade.
    pub fn store_ref(&self) -> &Store {
        &self.store
    }

    // ========================================================================
    // RECOVERY
    // ========================================================================

    /// Replay surviving journal entries. Ids are stable, so replaying an
    /// already-committed entry is a no-op; every successfully applied entry
    /// is tombstoned and an empty journal is removed.
    fn recover(&self) -> Result<()> {
        let entries = self.wal.valid_entries(DEFAULT_MAX_ENTRY_AGE)?;
        if entries.is_empty() {
            self.wal.prune_stale(DEFAULT_MAX_ENTRY_AGE)?;
            return Ok(());
        }

        tracing::info!("Replaying {} journal entries", entries.len());
        for entry in entries {
            match self.replay(&entry) {
                Ok(()) => self.wal.append_remove(&entry.id)?,
                Err(e) => {
                    tracing::warn!("Journal replay failed for {}: {}", entry.id, e);
                }
            }
        }

        if self.wal.is_empty()? {
            self.wal.clear()?;
        }
        Ok(())
    }

    fn replay(&self, entry: &WalEntry) -> Result<()> {
        match entry.operation {
            WalOperation::Store => {
                if self.store.get_by_id(&entry.id)?.is_none() {
                    let input: FactInput = serde_json::from_value(entry.data.clone())
                        .map_err(|e| WalError::Serde(e))?;
                    let fact = self.store.store_with_id(&entry.id, input)?;
                    self.mirror_to_vectors(&fact);
                }
                Ok(())
            }
            WalOperation::Update => {
                let old_id = entry.data.get("oldId").and_then(|v| v.as_str());
                let new_id = entry.data.get("newId").and_then(|v| v.as_str());
                if let Some(old_id) = old_id {
                    self.store.supersede(old_id, new_id)?;
                }
                Ok(())
            }
            WalOperation::Delete => {
                self.store.delete(&entry.id)?;
                #[cfg(feature = "vector-search")]
                if let Some(vectors) = &self.vectors {
                    let _ = vectors.delete(&entry.id);
                }
                Ok(())
            }
        }
    }

    // ========================================================================
    // WRITE PATH
    // ========================================================================

    /// Store a fact: journal, commit, mirror, tombstone, strengthen.
    pub fn store(&self, input: FactInput) -> Result<Fact> {
        Ok(self.store_classified(input, false)?.fact)
    }

    /// Store with classify-before-write when a model is configured. The
    /// candidate is compared against its structurally closest existing
    /// facts and the model decides between adding, superseding, retracting,
    /// and dropping the utterance.
    pub fn store_classified(&self, input: FactInput, classify: bool) -> Result<StoreReceipt> {
        if classify {
            if let Some(chat) = &self.chat {
                match self.classify_candidate(chat, &input) {
                    Ok(Classification::Add) => {}
                    Ok(Classification::Update { old_id }) => {
                        let mut input = input;
                        input.supersedes_id = Some(old_id.clone());
                        let fact = self.write_fact(input)?;
                        self.supersede(&old_id, Some(&fact.id))?;
                        return Ok(StoreReceipt {
                            fact,
                            decision: WriteDecision::Superseded { old_id },
                        });
                    }
                    Ok(Classification::Delete { old_id }) => {
                        self.supersede(&old_id, None)?;
                        let fact = self
                            .store
                            .get_by_id(&old_id)?
                            .ok_or_else(|| StoreError::NotFound(old_id.clone()))?;
                        return Ok(StoreReceipt {
                            fact,
                            decision: WriteDecision::Retracted { old_id },
                        });
                    }
                    Ok(Classification::Noop { existing_id }) => {
                        let fact = self
                            .store
                            .get_by_id(&existing_id)?
                            .ok_or_else(|| StoreError::NotFound(existing_id.clone()))?;
                        return Ok(StoreReceipt {
                            fact,
                            decision: WriteDecision::Noop { existing_id },
                        });
                    }
                    Err(e) => {
                        // Degraded path: classification never blocks a write
                        if matches!(e, ProviderError::Unconfigured(_)) {
                            self.warn_once(&format!("classification unavailable: {}", e));
                        } else {
                            tracing::warn!("Classification failed, storing as-is: {}", e);
                        }
                    }
                }
            }
        }

        let supersedes = input.supersedes_id.clone();
        let fact = self.write_fact(input)?;
        if let Some(old_id) = supersedes {
            self.supersede(&old_id, Some(&fact.id))?;
            return Ok(StoreReceipt {
                fact,
                decision: WriteDecision::Superseded { old_id },
            });
        }
        Ok(StoreReceipt {
            fact,
            decision: WriteDecision::Added,
        })
    }

    /// The journaled insert: WAL append, relational commit, vector mirror,
    /// tombstone, co-recall strengthening.
    fn write_fact(&self, input: FactInput) -> Result<Fact> {
        let id = crate::storage::new_fact_id();
        let entry = WalEntry::new(
            id.clone(),
            WalOperation::Store,
            serde_json::to_value(&input).map_err(WalError::Serde)?,
        );
        // The journal append is the only failure that aborts a write
        self.wal.append(&entry)?;

        let fact = match self.store.store_with_id(&id, input) {
            Ok(fact) => fact,
            Err(e) => {
                // Leave the entry for replay unless the input itself is bad
                if matches!(e, StoreError::InvalidInput(_) | StoreError::InvalidScope(_)) {
                    let _ = self.wal.append_remove(&id);
                }
                return Err(e.into());
            }
        };

        let mirrored = self.mirror_to_vectors(&fact);
        if mirrored {
            self.wal.append_remove(&entry.id)?;
        } else {
            // Keep the journal entry; replay will retry the mirror
            tracing::warn!("Vector mirror deferred for {}", fact.id);
        }

        self.strengthen_co_recalled(&fact.id);
        Ok(fact)
    }

    /// Mirror a fact into the vector index. Returns false only when a
    /// vector write genuinely failed (embedding unavailability is not a
    /// failure, it is a configuration state).
    fn mirror_to_vectors(&self, fact: &Fact) -> bool {
        #[cfg(feature = "vector-search")]
        if let (Some(vectors), Some(embedder)) = (&self.vectors, &self.embedder) {
            let vector = match embedder.embed(&fact.text) {
                Ok(v) => v,
                Err(ProviderError::Unconfigured(msg)) => {
                    self.warn_once(&format!("embeddings unavailable: {}", msg));
                    return true;
                }
                Err(e) => {
                    tracing::warn!("Embedding failed for {}: {}", fact.id, e);
                    return true;
                }
            };
            let record = VectorRecord {
                id: fact.id.clone(),
                text: fact.text.clone(),
                vector,
                importance: fact.importance,
                category: fact.category.clone(),
            };
            if let Err(e) = vectors.store(&record) {
                tracing::warn!("Vector write failed for {}: {}", fact.id, e);
                return false;
            }
        }
        let _ = fact;
        true
    }

    /// Best-effort RELATED_TO strengthening between a new fact and the ids
    /// co-recalled in the most recent search
    fn strengthen_co_recalled(&self, fact_id: &str) {
        let recalled = match self.last_recalled.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        for other in recalled.iter().take(5) {
            if other != fact_id {
                if let Err(e) = self.store.strengthen_related(fact_id, other) {
                    tracing::debug!("Co-recall strengthening skipped: {}", e);
                }
            }
        }
    }

    /// Supersede `old_id`, journaled as an update
    pub fn supersede(&self, old_id: &str, new_id: Option<&str>) -> Result<bool> {
        let entry = WalEntry::new(
            old_id.to_string(),
            WalOperation::Update,
            json!({ "oldId": old_id, "newId": new_id }),
        );
        self.wal.append(&entry)?;
        let changed = self.store.supersede(old_id, new_id)?;
        self.wal.append_remove(&entry.id)?;
        Ok(changed)
    }

    /// Delete a fact from both indexes, journaled
    pub fn delete(&self, id: &str) -> Result<bool> {
        let entry = WalEntry::new(id.to_string(), WalOperation::Delete, json!(null));
        self.wal.append(&entry)?;

        let deleted = self.store.delete(id)?;
        #[cfg(feature = "vector-search")]
        if let Some(vectors) = &self.vectors {
            if let Err(e) = vectors.delete(id) {
                tracing::warn!("Vector delete failed for {}: {}", id, e);
            }
        }

        self.wal.append_remove(&entry.id)?;
        Ok(deleted)
    }

    // ========================================================================
    // READ PATH
    // ========================================================================

    /// Dual-store search: FTS and (optionally) ANN in one pass, merged by
    /// id, ranked by composite salience, with access counters refreshed for
    /// the returned rows.
    pub fn search(&self, query: &str, limit: usize, opts: &SearchOptions) -> Result<Vec<SearchHit>> {
        let candidates = self.store.search(query, limit * 2, &opts.query)?;

        let mut hits: Vec<(Fact, Option<f64>, Option<f64>)> = candidates
            .into_iter()
            .map(|(fact, rank)| (fact, Some(rank), None))
            .collect();

        #[cfg(feature = "vector-search")]
        if opts.vector {
            for vector_hit in self.vector_candidates(query, limit * 2, opts)? {
                if let Some(existing) = hits.iter_mut().find(|(f, _, _)| f.id == vector_hit.0.id) {
                    existing.2 = Some(vector_hit.1);
                } else {
                    hits.push((vector_hit.0, None, Some(vector_hit.1)));
                }
            }
        }

        if hits.is_empty() {
            return Ok(vec![]);
        }

        let now = Utc::now();
        let ranks: Vec<f64> = hits.iter().filter_map(|(_, rank, _)| *rank).collect();
        let min_rank = ranks.iter().copied().fold(f64::INFINITY, f64::min);
        let max_rank = ranks.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mut scored: Vec<SearchHit> = hits
            .into_iter()
            .map(|(fact, rank, vector_score)| {
                // Keyword hits carry their normalized BM25; vector-only hits
                // use the ANN similarity as the relevance signal
                let keyword_score = rank.map(|r| bm25_normalize(r, min_rank, max_rank));
                let relevance = keyword_score.or(vector_score).unwrap_or(0.0);
                let signals = FactSignals {
                    bm25_rank: rank,
                    expires_at: fact.expires_at,
                    confidence: fact.confidence,
                    reinforced_count: fact.reinforced_count,
                    recall_count: fact.recall_count,
                    last_accessed: fact.last_accessed,
                };
                let score = fact_search_score(relevance, &signals, now, &self.ranker);
                let match_kind = match (keyword_score.is_some(), vector_score.is_some()) {
                    (true, true) => MatchKind::Both,
                    (false, true) => MatchKind::Vector,
                    _ => MatchKind::Keyword,
                };
                SearchHit {
                    fact,
                    score,
                    match_kind,
                    keyword_score,
                    vector_score,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let a_date = a.fact.source_date.unwrap_or(a.fact.created_at);
                    let b_date = b.fact.source_date.unwrap_or(b.fact.created_at);
                    b_date.cmp(&a_date)
                })
        });
        scored.truncate(limit);

        self.after_recall(&scored);
        Ok(scored)
    }

    /// Exact lookup on the normalized triple, salience-ordered
    pub fn lookup(
        &self,
        entity: &str,
        key: Option<&str>,
        opts: &QueryOptions,
    ) -> Result<Vec<SearchHit>> {
        let now = Utc::now();
        let mut scored: Vec<SearchHit> = self
            .store
            .lookup(entity, key, opts)?
            .into_iter()
            .map(|fact| {
                let signals = FactSignals {
                    bm25_rank: None,
                    expires_at: fact.expires_at,
                    confidence: fact.confidence,
                    reinforced_count: fact.reinforced_count,
                    recall_count: fact.recall_count,
                    last_accessed: fact.last_accessed,
                };
                let score = fact_lookup_score(&signals, now, &self.ranker);
                SearchHit {
                    fact,
                    score,
                    match_kind: MatchKind::Keyword,
                    keyword_score: None,
                    vector_score: None,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        self.after_recall(&scored);
        Ok(scored)
    }

    /// Post-recall bookkeeping: refresh access counters, remember the
    /// returned set, and strengthen co-occurrence edges. All best-effort.
    fn after_recall(&self, hits: &[SearchHit]) {
        let ids: Vec<String> = hits.iter().map(|h| h.fact.id.clone()).collect();
        if ids.is_empty() {
            return;
        }

        if let Err(e) = self.store.refresh_accessed(&ids) {
            tracing::warn!("Access refresh failed: {}", e);
        }

        // Co-returned pairs get a RELATED_TO bump
        for (i, a) in ids.iter().enumerate() {
            for b in ids.iter().skip(i + 1) {
                if let Err(e) = self.store.strengthen_related(a, b) {
                    tracing::debug!("Hebbian strengthening skipped: {}", e);
                }
            }
        }

        if let Ok(mut last) = self.last_recalled.lock() {
            *last = ids;
        }
    }

    #[cfg(feature = "vector-search")]
    fn vector_candidates(
        &self,
        query: &str,
        limit: usize,
        opts: &SearchOptions,
    ) -> Result<Vec<(Fact, f64)>> {
        let (Some(vectors), Some(embedder)) = (&self.vectors, &self.embedder) else {
            return Ok(vec![]);
        };

        let embedding = match self.query_embedding(embedder.as_ref(), query) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Query embedding failed, keyword-only search: {}", e);
                return Ok(vec![]);
            }
        };

        let min_score = opts.min_score.unwrap_or(DEFAULT_MIN_SCORE);
        let superseded = self.store.superseded_texts()?;
        let now = Utc::now();

        let mut out = Vec::new();
        for hit in vectors.search(&embedding, limit, min_score) {
            // Post-hoc supersession filter by normalized lowercase text
            if superseded.contains(&hit.text.to_lowercase()) {
                continue;
            }
            let Some(fact) = self.store.get_by_id(&hit.id)? else {
                continue;
            };
            if !fact.is_visible_at(now) && opts.query.as_of.is_none() {
                continue;
            }
            if let Some(at) = opts.query.as_of {
                if !fact.was_valid_at(at) {
                    continue;
                }
            }
            if !scope_admits(&opts.query.scope, &fact) {
                continue;
            }
            if let Some(tag) = &opts.query.tag {
                if !fact.tags.iter().any(|t| t == &tag.to_lowercase()) {
                    continue;
                }
            }
            if !opts.query.include_cold && fact.tier == crate::memory::Tier::Cold {
                continue;
            }
            out.push((fact, hit.score));
        }
        Ok(out)
    }

    #[cfg(feature = "vector-search")]
    fn query_embedding(
        &self,
        embedder: &dyn Embedder,
        query: &str,
    ) -> std::result::Result<Vec<f32>, ProviderError> {
        if let Ok(mut cache) = self.query_cache.lock() {
            if let Some(cached) = cache.get(query) {
                tracing::debug!("Query embedding cache hit");
                return Ok(cached.clone());
            }
        }
        let embedding = embedder.embed(query)?;
        if let Ok(mut cache) = self.query_cache.lock() {
            cache.put(query.to_string(), embedding.clone());
        }
        Ok(embedding)
    }

    // ========================================================================
    // DELEGATED MAINTENANCE API
    //
    // Single-store operations pass straight through; they hold no
    // cross-store invariant, so no journaling is needed.
    // ========================================================================

    pub fn get_by_id(&self, id: &str) -> Result<Option<Fact>> {
        Ok(self.store.get_by_id(id)?)
    }

    pub fn find_by_id_prefix(&self, prefix: &str) -> Result<crate::memory::IdPrefixMatch> {
        Ok(self.store.find_by_id_prefix(prefix)?)
    }

    pub fn list(&self, limit: usize, offset: usize) -> Result<Vec<Fact>> {
        Ok(self.store.list(limit, offset)?)
    }

    pub fn get_all(&self, opts: &QueryOptions) -> Result<Vec<Fact>> {
        Ok(self.store.get_all(opts)?)
    }

    pub fn reinforce(&self, id: &str, quote: &str) -> Result<Fact> {
        Ok(self.store.reinforce_fact(id, quote)?)
    }

    pub fn confirm(&self, id: &str) -> Result<Fact> {
        Ok(self.store.confirm(id)?)
    }

    pub fn set_tier(&self, id: &str, tier: crate::memory::Tier) -> Result<()> {
        Ok(self.store.set_tier(id, tier)?)
    }

    pub fn promote_scope(
        &self,
        id: &str,
        scope: crate::memory::Scope,
        target: Option<&str>,
    ) -> Result<()> {
        Ok(self.store.promote_scope(id, scope, target)?)
    }

    pub fn prune_expired(&self) -> Result<usize> {
        Ok(self.store.prune_expired()?)
    }

    pub fn prune_session_scope(&self, session_id: &str) -> Result<usize> {
        Ok(self.store.prune_session_scope(session_id)?)
    }

    pub fn decay_confidence(&self, older_than_days: i64, factor: f64) -> Result<usize> {
        Ok(self.store.decay_confidence(older_than_days, factor)?)
    }

    pub fn run_compaction(
        &self,
        opts: &crate::storage::CompactionOptions,
    ) -> Result<crate::storage::CompactionReport> {
        Ok(self.store.run_compaction(opts)?)
    }

    pub fn get_hot_facts(&self, max_tokens: usize) -> Result<Vec<Fact>> {
        Ok(self.store.get_hot_facts(max_tokens)?)
    }

    // Graph

    pub fn create_link(
        &self,
        from_id: &str,
        to_id: &str,
        link_type: crate::memory::LinkType,
        strength: f64,
    ) -> Result<crate::memory::MemoryLink> {
        Ok(self.store.create_link(from_id, to_id, link_type, strength)?)
    }

    pub fn get_links_from(&self, id: &str) -> Result<Vec<crate::memory::MemoryLink>> {
        Ok(self.store.get_links_from(id)?)
    }

    pub fn get_links_to(&self, id: &str) -> Result<Vec<crate::memory::MemoryLink>> {
        Ok(self.store.get_links_to(id)?)
    }

    pub fn get_connected_fact_ids(
        &self,
        seed_ids: &[String],
        max_depth: usize,
    ) -> Result<std::collections::HashSet<String>> {
        Ok(self.store.get_connected_fact_ids(seed_ids, max_depth)?)
    }

    // Procedures

    pub fn upsert_procedure(
        &self,
        input: crate::memory::ProcedureInput,
    ) -> Result<crate::memory::Procedure> {
        Ok(self.store.upsert_procedure(input)?)
    }

    pub fn search_procedures_ranked(
        &self,
        query: &str,
        limit: usize,
        reinforcement_boost: f64,
        scope: &ScopeFilter,
    ) -> Result<Vec<crate::memory::ProcedureHit>> {
        Ok(self
            .store
            .search_procedures_ranked(query, limit, reinforcement_boost, scope)?)
    }

    pub fn record_procedure_success(
        &self,
        id: &str,
        recipe_json: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<crate::memory::Procedure> {
        Ok(self.store.record_procedure_success(id, recipe_json, session_id)?)
    }

    pub fn record_procedure_failure(
        &self,
        id: &str,
        recipe_json: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<crate::memory::Procedure> {
        Ok(self.store.record_procedure_failure(id, recipe_json, session_id)?)
    }

    pub fn reinforce_procedure(
        &self,
        id: &str,
        quote: &str,
        threshold: i64,
    ) -> Result<crate::memory::Procedure> {
        Ok(self.store.reinforce_procedure(id, quote, threshold)?)
    }

    // ========================================================================
    // CHECKPOINTS
    // ========================================================================

    /// Persist a session checkpoint: JSON context under a timestamped key
    pub fn save_checkpoint(&self, context: &serde_json::Value) -> Result<Fact> {
        let now = Utc::now();
        let mut input = FactInput::new(
            serde_json::to_string(context).map_err(WalError::Serde)?,
        );
        input.entity = Some("system".into());
        input.key = Some(format!("checkpoint:{}", now.timestamp()));
        input.source = Some("checkpoint".into());
        input.decay_class = Some(crate::memory::DecayClass::Checkpoint);
        self.store(input)
    }

    /// Latest non-expired checkpoint, with its decoded context
    pub fn restore_checkpoint(&self) -> Result<Option<(Fact, serde_json::Value)>> {
        let rows = self
            .store
            .lookup("system", None, &QueryOptions::default())?;
        let latest = rows
            .into_iter()
            .filter(|f| {
                f.key
                    .as_deref()
                    .map(|k| k.starts_with("checkpoint:"))
                    .unwrap_or(false)
            })
            .max_by_key(|f| f.created_at);

        Ok(latest.map(|fact| {
            let context = serde_json::from_str(&fact.text).unwrap_or_else(|e| {
                tracing::info!("Corrupt checkpoint context, substituting empty: {}", e);
                json!({})
            });
            (fact, context)
        }))
    }

    // ========================================================================
    // TELEMETRY & WARNINGS
    // ========================================================================

    pub fn stats(&self) -> Result<MemoryStats> {
        Ok(self.store.stats()?)
    }

    /// Pending (not yet tombstoned) journal entries
    pub fn pending_journal_entries(&self) -> Result<usize> {
        Ok(self.wal.read_all()?.len())
    }

    fn warn_once(&self, message: &str) {
        if !self.config_warning_sent.swap(true, Ordering::SeqCst) {
            tracing::warn!("{}", message);
        }
    }

    // ------------------------------------------------------------------
    // classification plumbing lives in classify.rs
    // ------------------------------------------------------------------

    fn classify_candidate(
        &self,
        chat: &ChatRouter,
        input: &FactInput,
    ) -> std::result::Result<Classification, ProviderError> {
        let candidates = classify::structural_candidates(&self.store, input)
            .map_err(|e| ProviderError::Fatal(e.to_string()))?;
        if candidates.is_empty() {
            return Ok(Classification::Add);
        }
        let prompt = classify::build_prompt(input, &candidates);
        let response = chat.complete(&prompt, &ChatOptions::default())?;
        Ok(classify::parse_response(&response, &candidates))
    }
}

/// Scope check for vector-only hits that bypassed the SQL filter
#[cfg(feature = "vector-search")]
fn scope_admits(filter: &ScopeFilter, fact: &Fact) -> bool {
    use crate::memory::Scope;
    match fact.scope {
        Scope::Global => true,
        Scope::User => fact.scope_target.as_deref() == filter.user_id.as_deref(),
        Scope::Agent => fact.scope_target.as_deref() == filter.agent_id.as_deref(),
        Scope::Session => fact.scope_target.as_deref() == filter.session_id.as_deref(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
