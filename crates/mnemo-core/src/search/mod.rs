//! Search Module
//!
//! Query preparation, ranking math, and the ANN vector store:
//! - Keyword: FTS operator stripping and OR-of-terms query building
//! - Ranker: composite salience for facts and procedures
//! - Vector: HNSW (USearch) similarity over fact embeddings

mod keyword;
mod ranker;

#[cfg(feature = "vector-search")]
mod vector;

pub use keyword::{build_match_query, sanitize_fts_query};

pub use ranker::{
    bm25_normalize, fact_lookup_score, fact_search_score, freshness, procedure_score,
    FactSignals, ProcedureSignals, RankerConfig, DEFAULT_ACCESS_BOOST, DEFAULT_HALF_LIFE_DAYS,
    DEFAULT_REINFORCEMENT_BOOST, DEGENERATE_RANK_FALLBACK,
};

#[cfg(feature = "vector-search")]
pub use vector::{
    VectorHit, VectorRecord, VectorSearchError, VectorStore, DEFAULT_DUPLICATE_THRESHOLD,
    DEFAULT_MIN_SCORE,
};
