//! Tagger & Normalizer
//!
//! Deterministic tag extraction over a fixed, ordered pattern list, plus the
//! canonical text digest used for fuzzy dedup. Tags are serialized with
//! comma sentinels (`,a,b,`) so queries can test membership with a plain
//! substring match.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

// ============================================================================
// TAG PATTERNS
// ============================================================================

/// Ordered (tag, pattern) pairs. First match per tag wins; patterns are
/// applied to the lowercased `text + entity`.
static TAG_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    let raw: &[(&str, &str)] = &[
        ("decision", r"\b(decided|decision|chose|going with|settled on)\b"),
        ("preference", r"\b(prefers?|likes?|favorite|would rather)\b"),
        ("task", r"\b(task|todo|working on|wip|in progress)\b"),
        ("blocker", r"\b(blocked|blocker|stuck on|waiting on)\b"),
        ("identity", r"\b(my name is|name is|i am called|goes by)\b"),
        ("contact", r"\b(email|phone|address|reachable at)\b"),
        ("config", r"\b(config|setting|env(ironment)? var|flag)\b"),
        ("credential", r"\b(api.?key|token|password|secret)\b"),
        ("deadline", r"\b(due|deadline|by (mon|tues|wednes|thurs|fri|satur|sun)day)\b"),
        ("convention", r"\b(convention|style guide|always use|never use)\b"),
    ];
    raw.iter()
        .filter_map(|(tag, pattern)| match Regex::new(pattern) {
            Ok(re) => Some((*tag, re)),
            Err(e) => {
                tracing::info!("Dropping bad tag pattern '{}': {}", pattern, e);
                None
            }
        })
        .collect()
});

/// Extract tags from a fact's text and entity
pub fn extract_tags(text: &str, entity: Option<&str>) -> Vec<String> {
    let haystack = match entity {
        Some(e) => format!("{} {}", text, e).to_lowercase(),
        None => text.to_lowercase(),
    };

    TAG_PATTERNS
        .iter()
        .filter(|(_, re)| re.is_match(&haystack))
        .map(|(tag, _)| (*tag).to_string())
        .collect()
}

// ============================================================================
// TAG SERIALIZATION
// ============================================================================

/// Serialize tags with comma sentinels: `["a","b"]` becomes `,a,b,`.
/// Empty list serializes to the empty string.
pub fn serialize_tags(tags: &[String]) -> String {
    if tags.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(tags.iter().map(|t| t.len() + 1).sum::<usize>() + 1);
    out.push(',');
    for tag in tags {
        out.push_str(&tag.to_lowercase());
        out.push(',');
    }
    out
}

/// Inverse of [`serialize_tags`]
pub fn deserialize_tags(serialized: &str) -> Vec<String> {
    serialized
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// The `LIKE` needle testing membership of `tag` in a serialized list
pub fn tag_needle(tag: &str) -> String {
    format!("%,{},%", tag.to_lowercase())
}

// ============================================================================
// NORMALIZED HASH
// ============================================================================

/// SHA-256 of the lowercased, whitespace-collapsed text. Two utterances that
/// differ only in casing or spacing hash identically, which is what the
/// fuzzy-dedup path keys on.
pub fn normalized_hash(text: &str) -> String {
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let digest = Sha256::digest(collapsed.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================
