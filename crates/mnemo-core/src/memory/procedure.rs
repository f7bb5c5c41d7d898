//! Procedure - a reusable recipe with outcome tracking
//!
//! Procedures mirror facts but index a task pattern instead of free text,
//! and carry success/failure counters that drive a derived confidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fact::Scope;

// ============================================================================
// PROCEDURE TYPE
// ============================================================================

/// Whether the recipe is something to do or something to avoid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureType {
    #[default]
    Positive,
    Negative,
}

impl ProcedureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcedureType::Positive => "positive",
            ProcedureType::Negative => "negative",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "negative" => ProcedureType::Negative,
            _ => ProcedureType::Positive,
        }
    }
}

impl std::fmt::Display for ProcedureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// PROCEDURE
// ============================================================================

/// A stored recipe
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Procedure {
    pub id: String,
    /// Full-text indexed description of when the recipe applies
    pub task_pattern: String,
    /// Opaque recipe payload
    pub recipe_json: String,
    pub procedure_type: ProcedureType,

    // ========== Validation ==========
    pub success_count: i64,
    pub failure_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_validated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failed: Option<DateTime<Utc>>,
    /// clamp(0.1, 0.95, 0.5 + 0.1 * (success - failure)) unless reinforced past it
    pub confidence: f64,

    // ========== Lifecycle ==========
    pub ttl_days: i64,
    pub promoted_to_skill: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoted_at: Option<DateTime<Utc>>,
    /// Declared for downstream skill tooling; the engine never acts on these
    pub auto_publish: bool,
    pub notify: bool,

    // ========== Reinforcement ==========
    pub reinforced_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reinforced_at: Option<DateTime<Utc>>,
    pub reinforced_quotes: Vec<String>,

    // ========== Scope & provenance ==========
    pub scope: Scope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_target: Option<String>,
    pub source_sessions: Vec<String>,
    /// Session ids already counted toward success/failure; a session id
    /// counted once cannot recount
    pub evidence_sessions: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derived confidence from outcome counters
pub fn derived_confidence(success: i64, failure: i64) -> f64 {
    (0.5 + 0.1 * (success - failure) as f64).clamp(0.1, 0.95)
}

/// Default TTL for a procedure that is never re-validated
pub const DEFAULT_PROCEDURE_TTL_DAYS: i64 = 30;

// ============================================================================
// INPUT
// ============================================================================

/// Input for upserting a procedure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProcedureInput {
    pub task_pattern: String,
    pub recipe_json: String,
    #[serde(default)]
    pub procedure_type: ProcedureType,
    #[serde(default)]
    pub success_count: i64,
    #[serde(default)]
    pub failure_count: i64,
    /// Explicit confidence override; absent = derive from counters
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub ttl_days: Option<i64>,
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub scope_target: Option<String>,
    #[serde(default)]
    pub source_sessions: Vec<String>,
}

impl ProcedureInput {
    pub fn new(task_pattern: impl Into<String>, recipe_json: impl Into<String>) -> Self {
        Self {
            task_pattern: task_pattern.into(),
            recipe_json: recipe_json.into(),
            procedure_type: ProcedureType::Positive,
            success_count: 0,
            failure_count: 0,
            confidence: None,
            ttl_days: None,
            scope: None,
            scope_target: None,
            source_sessions: vec![],
        }
    }
}

/// A ranked procedure hit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureHit {
    pub procedure: Procedure,
    pub score: f64,
}

// ============================================================================
// TESTS
// ============================================================================
