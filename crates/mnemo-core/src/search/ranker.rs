//! Salience Ranker
//!
//! Pure scoring math for facts and procedures. Relevance from the indexes is
//! only one signal; freshness, confidence, reinforcement, access frequency,
//! and access recency all move the final ordering.

use chrono::{DateTime, Utc};

// ============================================================================
// DEFAULTS
// ============================================================================

/// Multiplier applied per ln(1 + recall_count)
pub const DEFAULT_ACCESS_BOOST: f64 = 0.1;

/// Days for the access-recency decay to halve the score
pub const DEFAULT_HALF_LIFE_DAYS: f64 = 30.0;

/// Additive boost for any reinforced row
pub const DEFAULT_REINFORCEMENT_BOOST: f64 = 0.1;

/// Normalized-rank value used when the range is degenerate (single result,
/// or identical ranks). 0.8 keeps the lone hit strong without pinning it.
pub const DEGENERATE_RANK_FALLBACK: f64 = 0.8;

/// Freshness window: facts expiring further out than this are fully fresh
const FRESHNESS_WINDOW_SECS: f64 = 7.0 * 86_400.0;

// ============================================================================
// FACT SALIENCE
// ============================================================================

/// Tunable ranking weights
#[derive(Debug, Clone, Copy)]
pub struct RankerConfig {
    pub access_boost: f64,
    pub half_life_days: f64,
    pub reinforcement_boost: f64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            access_boost: DEFAULT_ACCESS_BOOST,
            half_life_days: DEFAULT_HALF_LIFE_DAYS,
            reinforcement_boost: DEFAULT_REINFORCEMENT_BOOST,
        }
    }
}

/// Per-candidate signals feeding the fact score
#[derive(Debug, Clone, Copy)]
pub struct FactSignals {
    /// Raw BM25 rank (lower = better) when the keyword index matched
    pub bm25_rank: Option<f64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub confidence: f64,
    pub reinforced_count: i64,
    pub recall_count: i64,
    pub last_accessed: Option<DateTime<Utc>>,
}

/// Normalize a BM25 rank into [0,1], higher = better.
/// Degenerate ranges (min == max) fall back to [`DEGENERATE_RANK_FALLBACK`].
pub fn bm25_normalize(rank: f64, min_rank: f64, max_rank: f64) -> f64 {
    let range = max_rank - min_rank;
    if !range.is_finite() || range <= f64::EPSILON {
        return DEGENERATE_RANK_FALLBACK;
    }
    let norm = 1.0 - (rank - min_rank) / range;
    if norm.is_nan() {
        DEGENERATE_RANK_FALLBACK
    } else {
        norm.clamp(0.0, 1.0)
    }
}

/// Freshness in [0,1]: 1 when no expiry, linearly decaying over the final
/// week before expiry.
pub fn freshness(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match expires_at {
        None => 1.0,
        Some(expiry) => {
            let remaining = (expiry - now).num_seconds() as f64;
            (remaining / FRESHNESS_WINDOW_SECS).clamp(0.0, 1.0)
        }
    }
}

/// Multiplier rewarding frequently and recently recalled rows
fn salience_multiplier(
    recall_count: i64,
    last_accessed: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &RankerConfig,
) -> f64 {
    let frequency = 1.0 + config.access_boost * (1.0 + recall_count as f64).ln();
    let days_since = last_accessed
        .map(|t| ((now - t).num_seconds() as f64 / 86_400.0).max(0.0))
        .unwrap_or(0.0);
    let recency = 1.0 / (1.0 + days_since / config.half_life_days);
    frequency * recency
}

/// Composite search score for one candidate.
/// `bm25_norm` must already be normalized over the candidate set.
pub fn fact_search_score(
    bm25_norm: f64,
    signals: &FactSignals,
    now: DateTime<Utc>,
    config: &RankerConfig,
) -> f64 {
    let reinforce = if signals.reinforced_count > 0 {
        config.reinforcement_boost
    } else {
        0.0
    };
    let base = (0.6 * bm25_norm
        + 0.25 * freshness(signals.expires_at, now)
        + 0.15 * signals.confidence
        + reinforce)
        .min(1.0);

    let salience = base
        * salience_multiplier(signals.recall_count, signals.last_accessed, now, config);
    salience.clamp(0.0, 1.0)
}

/// Lookup score: stored confidence as base, same salience multiplier
pub fn fact_lookup_score(signals: &FactSignals, now: DateTime<Utc>, config: &RankerConfig) -> f64 {
    let salience = signals.confidence
        * salience_multiplier(signals.recall_count, signals.last_accessed, now, config);
    salience.clamp(0.0, 1.0)
}

// ============================================================================
// PROCEDURE SCORING
// ============================================================================

/// Age after which a procedure's recency factor bottoms out
const PROCEDURE_RECENCY_WINDOW_SECS: f64 = 30.0 * 86_400.0;

/// Window within which a failure halves the score
const RECENT_FAILURE_WINDOW_SECS: i64 = 7 * 86_400;

/// Signals feeding a procedure's ranked-search score
#[derive(Debug, Clone, Copy)]
pub struct ProcedureSignals {
    pub fts_rank: f64,
    pub confidence: f64,
    pub success_count: i64,
    pub failure_count: i64,
    pub last_validated: Option<DateTime<Utc>>,
    pub last_failed: Option<DateTime<Utc>>,
    pub reinforced_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Ranked-search score for one procedure candidate
pub fn procedure_score(
    fts_norm: f64,
    signals: &ProcedureSignals,
    now: DateTime<Utc>,
    reinforcement_boost: f64,
) -> f64 {
    let age_secs = (now - signals.created_at).num_seconds().max(0) as f64;
    let recency_factor = (1.0 - age_secs / PROCEDURE_RECENCY_WINDOW_SECS).max(0.3);

    let total = signals.success_count + signals.failure_count;
    let success_rate_weight = if total == 0 {
        0.75
    } else {
        0.5 + 0.5 * signals.success_count as f64 / total as f64
    };

    let recent_failure_penalty = match signals.last_failed {
        Some(failed) if (now - failed).num_seconds() < RECENT_FAILURE_WINDOW_SECS => 0.5,
        _ => 1.0,
    };

    let validation_penalty = if signals.last_validated.is_none() {
        0.7
    } else {
        1.0
    };

    let reinforce = if signals.reinforced_count > 0 {
        reinforcement_boost
    } else {
        0.0
    };

    let base = 0.6 * fts_norm + 0.4 * signals.confidence + reinforce;
    (base * recency_factor * success_rate_weight * recent_failure_penalty * validation_penalty)
        .clamp(0.0, 1.0)
}

// ============================================================================
// TESTS
// ============================================================================
