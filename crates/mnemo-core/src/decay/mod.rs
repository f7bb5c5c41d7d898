//! Decay & TTL
//!
//! Deterministic classifier mapping a fact's (entity, key, value, text) to a
//! lifetime class, plus the TTL table used at store time and on access
//! refresh. Signal sets are loadable per-language; English fallbacks are
//! always present.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::memory::DecayClass;

// ============================================================================
// TTL TABLE
// ============================================================================

/// TTL per decay class; `None` = never expires
pub fn ttl_for(class: DecayClass) -> Option<Duration> {
    match class {
        DecayClass::Permanent => None,
        DecayClass::Stable => Some(Duration::days(90)),
        DecayClass::Active => Some(Duration::days(14)),
        DecayClass::Session => Some(Duration::hours(24)),
        DecayClass::Checkpoint => Some(Duration::days(7)),
    }
}

/// Expiry instant for a fact stored now under `class`
pub fn expiry_for(class: DecayClass, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    ttl_for(class).map(|ttl| now + ttl)
}

// ============================================================================
// LANGUAGE RESOURCES
// ============================================================================

/// Regex token sets for the decay heuristics, keyed by signal kind.
///
/// Loadable from a JSON resource per natural language; the `Default`
/// implementation is the English set and is always merged in as a fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageResources {
    /// Signals that mark a statement as permanent (decisions, identity)
    pub permanent: Vec<String>,
    /// Signals that mark scratch state for the current session
    pub session: Vec<String>,
    /// Signals that mark active work
    pub active: Vec<String>,
}

impl Default for LanguageResources {
    fn default() -> Self {
        Self {
            permanent: vec![
                r"\bdecided\b".into(),
                r"\bdecision\b".into(),
                r"\balways\b".into(),
                r"\bnever\b".into(),
                r"\bconvention\b".into(),
                r"\bfrom now on\b".into(),
            ],
            session: vec![
                r"\bright now\b".into(),
                r"\bthis session\b".into(),
                r"\bat the moment\b".into(),
            ],
            active: vec![
                r"\bworking on\b".into(),
                r"\bcurrently\b".into(),
                r"\bin progress\b".into(),
                r"\bblocked (on|by)\b".into(),
            ],
        }
    }
}

impl LanguageResources {
    /// Parse a language resource file, merging the English fallback in so a
    /// sparse resource never loses coverage. Malformed JSON falls back to
    /// the defaults (corruption is non-fatal here).
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str::<LanguageResources>(json) {
            Ok(mut loaded) => {
                let english = Self::default();
                loaded.permanent.extend(english.permanent);
                loaded.session.extend(english.session);
                loaded.active.extend(english.active);
                loaded
            }
            Err(e) => {
                tracing::info!("Malformed language resource, using English defaults: {}", e);
                Self::default()
            }
        }
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

/// Keys that always pin a fact as permanent
const PERMANENT_KEYS: &[&str] = &[
    "name",
    "identity",
    "email",
    "phone",
    "contact",
    "birthday",
    "decision",
    "architecture",
    "convention",
];

/// Entities that always pin a fact as permanent
const PERMANENT_ENTITIES: &[&str] = &["decision", "convention"];

/// Keys that mark session-scratch state
const SESSION_KEYS: &[&str] = &["current_file", "temp", "debug", "working_on_right_now"];

/// Keys that mark active work items
const ACTIVE_KEYS: &[&str] = &["task", "todo", "wip", "branch", "sprint", "blocker"];

/// Deterministic decay classifier over (entity, key, value, text)
pub struct DecayClassifier {
    permanent: Vec<Regex>,
    session: Vec<Regex>,
    active: Vec<Regex>,
}

impl Default for DecayClassifier {
    fn default() -> Self {
        Self::new(&LanguageResources::default())
    }
}

impl DecayClassifier {
    /// Compile the signal sets. Patterns that fail to compile are dropped
    /// with a log line rather than failing the whole classifier.
    pub fn new(resources: &LanguageResources) -> Self {
        fn compile(patterns: &[String]) -> Vec<Regex> {
            patterns
                .iter()
                .filter_map(|p| match Regex::new(p) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::info!("Dropping bad decay pattern '{}': {}", p, e);
                        None
                    }
                })
                .collect()
        }
        Self {
            permanent: compile(&resources.permanent),
            session: compile(&resources.session),
            active: compile(&resources.active),
        }
    }

    /// Classify a candidate fact. Precedence: permanent > session > active >
    /// checkpoint > stable.
    pub fn classify(
        &self,
        entity: Option<&str>,
        key: Option<&str>,
        _value: Option<&str>,
        text: &str,
    ) -> DecayClass {
        let entity_lc = entity.map(str::to_lowercase).unwrap_or_default();
        let key_lc = key.map(str::to_lowercase).unwrap_or_default();
        let text_lc = text.to_lowercase();

        if PERMANENT_KEYS.iter().any(|k| key_lc.contains(k))
            || PERMANENT_ENTITIES.contains(&entity_lc.as_str())
            || self.permanent.iter().any(|re| re.is_match(&text_lc))
        {
            return DecayClass::Permanent;
        }

        if SESSION_KEYS.contains(&key_lc.as_str())
            || self.session.iter().any(|re| re.is_match(&text_lc))
        {
            return DecayClass::Session;
        }

        if ACTIVE_KEYS.contains(&key_lc.as_str())
            || self.active.iter().any(|re| re.is_match(&text_lc))
        {
            return DecayClass::Active;
        }

        if key_lc.contains("checkpoint") || key_lc.contains("preflight") {
            return DecayClass::Checkpoint;
        }

        DecayClass::Stable
    }
}

// ============================================================================
// TESTS
// ============================================================================
