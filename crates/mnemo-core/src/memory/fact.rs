//! Fact - the atomic unit of memory
//!
//! Each fact carries:
//! - Free text plus an optional normalized (entity, key, value) triple
//! - A decay class governing its TTL and refresh behavior
//! - Bi-temporal validity (when recorded vs. when true)
//! - Tier and scope controlling session-context eligibility and visibility

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// DECAY CLASS
// ============================================================================

/// Lifetime bucket for a fact
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecayClass {
    /// Never expires (identity, decisions, conventions)
    Permanent,
    /// Long-lived knowledge, refreshed on access
    #[default]
    Stable,
    /// Active work items (tasks, branches, blockers)
    Active,
    /// Scratch state for the current session only
    Session,
    /// Conversation checkpoints
    Checkpoint,
}

impl DecayClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecayClass::Permanent => "permanent",
            DecayClass::Stable => "stable",
            DecayClass::Active => "active",
            DecayClass::Session => "session",
            DecayClass::Checkpoint => "checkpoint",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "permanent" => DecayClass::Permanent,
            "active" => DecayClass::Active,
            "session" => DecayClass::Session,
            "checkpoint" => DecayClass::Checkpoint,
            _ => DecayClass::Stable,
        }
    }
}

impl std::fmt::Display for DecayClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// TIER
// ============================================================================

/// Storage tier controlling session-context eligibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Resident in session context
    Hot,
    /// Default tier, searchable
    #[default]
    Warm,
    /// Archival; excluded from default search
    Cold,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cold => "cold",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "hot" => Tier::Hot,
            "cold" => Tier::Cold,
            _ => Tier::Warm,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SCOPE
// ============================================================================

/// Visibility partition for a fact or procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Visible to every caller
    #[default]
    Global,
    /// Bound to one user id
    User,
    /// Bound to one agent id
    Agent,
    /// Bound to one session id; pruned with the session
    Session,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::User => "user",
            Scope::Agent => "agent",
            Scope::Session => "session",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "user" => Scope::User,
            "agent" => Scope::Agent,
            "session" => Scope::Session,
            _ => Scope::Global,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runtime identity used to restrict query visibility.
///
/// Must be derived from trusted runtime identity, never from caller-supplied
/// parameters of recall tools: a forged filter is a cross-user read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScopeFilter {
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
}

impl ScopeFilter {
    /// Filter that only admits global rows
    pub fn global_only() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }
}

// ============================================================================
// FACT
// ============================================================================

/// A fact in the memory store
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    /// Opaque 128-bit id, stable for the lifetime of the row
    pub id: String,
    /// The statement itself
    pub text: String,
    /// Normalized triple: subject entity
    pub entity: Option<String>,
    /// Normalized triple: attribute key
    pub key: Option<String>,
    /// Normalized triple: attribute value
    pub value: Option<String>,
    /// Free-form category
    pub category: Option<String>,
    /// Optional condensed form used for token budgeting
    pub summary: Option<String>,
    /// Lowercase tags
    pub tags: Vec<String>,

    // ========== Provenance ==========
    /// Where the fact came from (`conversation`, `cli`, `distillation`, ...)
    pub source: Option<String>,
    /// Session ids that contributed this fact
    pub source_sessions: Vec<String>,
    /// When the source statement was made
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_date: Option<DateTime<Utc>>,

    // ========== Weighting ==========
    /// Importance in [0,1]
    pub importance: f64,
    /// Confidence in [0,1]
    pub confidence: f64,

    // ========== Lifetime ==========
    pub decay_class: DecayClass,
    /// Absent = never expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_confirmed_at: Option<DateTime<Utc>>,

    // ========== Access ==========
    pub recall_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,

    // ========== Reinforcement ==========
    pub reinforced_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reinforced_at: Option<DateTime<Utc>>,
    /// Bounded queue of praise snippets (at most 10, each <= 200 chars)
    pub reinforced_quotes: Vec<String>,

    // ========== Bi-temporal ==========
    /// When this fact started being true
    pub valid_from: DateTime<Utc>,
    /// When it stopped being true (absent = currently true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    /// Predecessor fact replaced by this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes_id: Option<String>,
    /// Denormalized supersession markers for cheap filtering
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,

    // ========== Placement ==========
    pub tier: Tier,
    pub scope: Scope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_target: Option<String>,

    /// SHA-256 of the lowercased, whitespace-collapsed text
    pub normalized_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Fact {
    /// True iff the fact is visible to standard (non-temporal) queries
    pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
        self.superseded_at.is_none() && self.expires_at.map(|t| t > now).unwrap_or(true)
    }

    /// Bi-temporal check: was the fact true at `t`?
    pub fn was_valid_at(&self, t: DateTime<Utc>) -> bool {
        self.valid_from <= t && self.valid_until.map(|u| u > t).unwrap_or(true)
    }

    /// The text used for token budgeting: summary when present, else text
    pub fn budget_text(&self) -> &str {
        self.summary.as_deref().unwrap_or(&self.text)
    }
}

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Input for storing a new fact
///
/// Uses `deny_unknown_fields` to prevent field injection through tool calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FactInput {
    pub text: String,
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Explicit tags; when empty the tagger derives them
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_sessions: Vec<String>,
    #[serde(default)]
    pub source_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub importance: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Explicit decay class; absent = classify from content
    #[serde(default)]
    pub decay_class: Option<DecayClass>,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub supersedes_id: Option<String>,
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub scope_target: Option<String>,
}

impl Default for FactInput {
    fn default() -> Self {
        Self {
            text: String::new(),
            entity: None,
            key: None,
            value: None,
            category: None,
            summary: None,
            tags: vec![],
            source: None,
            source_sessions: vec![],
            source_date: None,
            importance: None,
            confidence: None,
            decay_class: None,
            valid_from: None,
            supersedes_id: None,
            tier: None,
            scope: None,
            scope_target: None,
        }
    }
}

impl FactInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Default importance when the caller does not weight the fact
pub const DEFAULT_IMPORTANCE: f64 = 0.7;

/// Default confidence for a freshly stored fact
pub const DEFAULT_CONFIDENCE: f64 = 1.0;

// ============================================================================
// QUERY OPTIONS & RESULTS
// ============================================================================

/// Options shared by `search` and `lookup`
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Include superseded rows
    pub include_superseded: bool,
    /// Include cold-tier rows
    pub include_cold: bool,
    /// Point-in-time view: rows valid at this instant. Overrides the
    /// default hide-superseded behavior.
    pub as_of: Option<DateTime<Utc>>,
    /// Restrict to rows carrying this tag
    pub tag: Option<String>,
    /// Visibility partition derived from runtime identity
    pub scope: ScopeFilter,
}

/// How a search candidate was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchKind {
    /// Full-text match only
    Keyword,
    /// Vector-similarity match only
    Vector,
    /// Both indexes agreed
    Both,
}

/// A ranked search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub fact: Fact,
    /// Composite salience in [0,1]
    pub score: f64,
    pub match_kind: MatchKind,
    /// Normalized BM25 contribution, when the keyword index matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_score: Option<f64>,
    /// ANN similarity, when the vector index matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f64>,
}

/// Result of resolving a short id prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdPrefixMatch {
    /// Prefix too short or nothing matched
    None,
    /// Exactly one row matched
    Unique { id: String },
    /// Several rows matched; `sample` holds at most three of them
    Ambiguous { count: usize, sample: Vec<String> },
}

/// Aggregate store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total_facts: i64,
    pub superseded_facts: i64,
    pub expired_facts: i64,
    pub total_procedures: i64,
    pub total_links: i64,
    pub by_decay_class: Vec<(String, i64)>,
    pub by_tier: Vec<(String, i64)>,
    pub by_scope: Vec<(String, i64)>,
    /// ceil(chars/4) over visible fact text
    pub estimated_stored_tokens: i64,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_decay_class_roundtrip() {
        for class in [
            DecayClass::Permanent,
            DecayClass::Stable,
            DecayClass::Active,
            DecayClass::Session,
            DecayClass::Checkpoint,
        ] {
            assert_eq!(DecayClass::parse_name(class.as_str()), class);
        }
        // Unknown names fall back to stable
        assert_eq!(DecayClass::parse_name("bogus"), DecayClass::Stable);
    }

    #[test]
    fn test_visibility() {
        let now = Utc::now();
        let mut fact = Fact {
            id: "f".into(),
            text: "t".into(),
            entity: None,
            key: None,
            value: None,
            category: None,
            summary: None,
            tags: vec![],
            source: None,
            source_sessions: vec![],
            source_date: None,
            importance: DEFAULT_IMPORTANCE,
            confidence: DEFAULT_CONFIDENCE,
            decay_class: DecayClass::Stable,
            expires_at: None,
            last_confirmed_at: None,
            recall_count: 0,
            last_accessed: None,
            reinforced_count: 0,
            last_reinforced_at: None,
            reinforced_quotes: vec![],
            valid_from: now - Duration::days(1),
            valid_until: None,
            supersedes_id: None,
            superseded_at: None,
            superseded_by: None,
            tier: Tier::Warm,
            scope: Scope::Global,
            scope_target: None,
            normalized_hash: String::new(),
            created_at: now,
        };

        assert!(fact.is_visible_at(now));
        assert!(fact.was_valid_at(now));

        fact.expires_at = Some(now - Duration::hours(1));
        assert!(!fact.is_visible_at(now));

        fact.expires_at = None;
        fact.superseded_at = Some(now);
        fact.valid_until = Some(now);
        assert!(!fact.is_visible_at(now));
        // Point-in-time still sees it before the supersession instant
        assert!(fact.was_valid_at(now - Duration::minutes(5)));
        assert!(!fact.was_valid_at(now + Duration::minutes(5)));
    }

    #[test]
    fn test_fact_input_deny_unknown_fields() {
        let json = r#"{"text": "db is postgres", "entity": "system"}"#;
        assert!(serde_json::from_str::<FactInput>(json).is_ok());

        let json_with_unknown = r#"{"text": "x", "scopeTarget": "alice", "evil": 1}"#;
        assert!(serde_json::from_str::<FactInput>(json_with_unknown).is_err());
    }

    #[test]
    fn test_budget_text_prefers_summary() {
        let mut input = FactInput::new("a long statement about the deployment");
        input.summary = Some("deploy note".into());
        // budget_text is exercised through Fact; quick structural check here
        assert_eq!(input.summary.as_deref(), Some("deploy note"));
    }
}
