//! # Mnemo Core
//!
//! Hybrid long-term memory engine for autonomous conversational agents.
//! Turns a stream of utterances into a persistent, queryable store of facts
//! and procedures, and serves them back under token budgets, scope
//! isolation, freshness, and contradiction handling:
//!
//! - **Dual-index search**: porter-stemmed FTS5 (BM25) plus HNSW ANN over
//!   embeddings, merged by id and ranked by composite salience
//! - **Bi-temporal supersession**: facts record both when they were stored
//!   and when they were true; contradictions resolve by superseding
//! - **Decay classes**: permanent/stable/active/session/checkpoint lifetimes
//!   with access-refresh TTLs
//! - **Tiering**: hot/warm/cold compaction under a token budget
//! - **Procedural memory**: positive/negative recipes with outcome-derived
//!   confidence and failure-aware ranking
//! - **Typed link graph**: SUPERSEDES/CAUSED_BY/PART_OF/RELATED_TO/
//!   DEPENDS_ON edges with Hebbian co-recall strengthening
//! - **Crash resilience**: fsynced write-ahead journal replayed on open
//! - **Credential vault**: AES-256-GCM under a scrypt-derived key
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mnemo_core::{FactInput, Memory, MemoryConfig, SearchOptions};
//!
//! let engine = Memory::open(MemoryConfig::in_dir("/var/lib/mnemo"))?;
//!
//! let mut fact = FactInput::new("The database is Postgres");
//! fact.entity = Some("system".into());
//! fact.key = Some("db".into());
//! engine.store(fact)?;
//!
//! let hits = engine.search("which database", 10, &SearchOptions::default())?;
//! ```
//!
//! ## Feature Flags
//!
//! - `vector-search` (default): HNSW vector index with USearch
//! - `bundled-sqlite` (default): compile SQLite into the binary

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod decay;
pub mod engine;
pub mod memory;
pub mod providers;
pub mod search;
pub mod storage;
pub mod tagger;
pub mod telemetry;
pub mod vault;
pub mod wal;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Data model
pub use memory::{
    canonical_pair, derived_confidence, DecayClass, Fact, FactInput, IdPrefixMatch, LinkType,
    MatchKind, MemoryLink, MemoryStats, Procedure, ProcedureHit, ProcedureInput, ProcedureType,
    QueryOptions, Scope, ScopeFilter, SearchHit, Tier, DEFAULT_CONFIDENCE, DEFAULT_IMPORTANCE,
    DEFAULT_PROCEDURE_TTL_DAYS, HEBBIAN_DELTA,
};

// Facade
pub use engine::{
    Classification, Memory, MemoryConfig, MemoryError, SearchOptions, StoreReceipt, WriteDecision,
};

// Storage layer
pub use storage::{
    apply_migrations, new_fact_id, CompactionOptions, CompactionReport, Store, StoreConfig,
    StoreError, MIGRATIONS,
};

// Ranking
pub use search::{
    bm25_normalize, build_match_query, sanitize_fts_query, RankerConfig, DEFAULT_ACCESS_BOOST,
    DEFAULT_HALF_LIFE_DAYS, DEFAULT_REINFORCEMENT_BOOST,
};

#[cfg(feature = "vector-search")]
pub use search::{VectorHit, VectorRecord, VectorSearchError, VectorStore};

// Journal
pub use wal::{WalEntry, WalError, WalOperation, WriteAheadLog};

// Vault
pub use vault::{CredentialEntry, CredentialInput, CredentialVault, VaultError, VaultStats};

// Lifetimes and classification
pub use decay::{expiry_for, ttl_for, DecayClassifier, LanguageResources};

// Collaborator interfaces
pub use providers::{Chat, ChatOptions, ChatRouter, Embedder, ProviderError};

// Token heuristics
pub use telemetry::{estimate_display_tokens, estimate_stored_tokens};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        DecayClass, Fact, FactInput, Memory, MemoryConfig, MemoryError, MemoryStats, Procedure,
        ProcedureInput, QueryOptions, Scope, ScopeFilter, SearchHit, SearchOptions, Tier,
    };

    pub use crate::{CredentialInput, CredentialVault};

    #[cfg(feature = "vector-search")]
    pub use crate::VectorStore;
}
