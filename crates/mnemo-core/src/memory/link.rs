//! Memory links - typed directed edges between facts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// LINK TYPE
// ============================================================================

/// Edge semantics between two facts
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkType {
    /// New fact replaces the target
    Supersedes,
    /// Effect points at its cause
    CausedBy,
    /// Component points at its whole
    PartOf,
    /// Symmetric association; direction canonicalized by id order
    RelatedTo,
    /// Source requires the target
    DependsOn,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Supersedes => "SUPERSEDES",
            LinkType::CausedBy => "CAUSED_BY",
            LinkType::PartOf => "PART_OF",
            LinkType::RelatedTo => "RELATED_TO",
            LinkType::DependsOn => "DEPENDS_ON",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SUPERSEDES" => Some(LinkType::Supersedes),
            "CAUSED_BY" => Some(LinkType::CausedBy),
            "PART_OF" => Some(LinkType::PartOf),
            "RELATED_TO" => Some(LinkType::RelatedTo),
            "DEPENDS_ON" => Some(LinkType::DependsOn),
            _ => None,
        }
    }

    /// Symmetric edge types are stored once per pair, lexicographically ordered
    pub fn is_symmetric(&self) -> bool {
        matches!(self, LinkType::RelatedTo)
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// MEMORY LINK
// ============================================================================

/// A typed, weighted edge between two facts. Deleted with either endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryLink {
    pub from_id: String,
    pub to_id: String,
    pub link_type: LinkType,
    /// Strength in [0,1]; co-recall bumps it by 0.1, saturating at 1
    pub strength: f64,
    pub created_at: DateTime<Utc>,
    pub last_strengthened: DateTime<Utc>,
}

/// Increment applied each time two facts are recalled together
pub const HEBBIAN_DELTA: f64 = 0.1;

/// Canonical endpoint order for symmetric edges
pub fn canonical_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_type_roundtrip() {
        for link_type in [
            LinkType::Supersedes,
            LinkType::CausedBy,
            LinkType::PartOf,
            LinkType::RelatedTo,
            LinkType::DependsOn,
        ] {
            assert_eq!(LinkType::parse_name(link_type.as_str()), Some(link_type));
        }
        assert_eq!(LinkType::parse_name("FRIENDS_WITH"), None);
    }

    #[test]
    fn test_canonical_pair_ordering() {
        assert_eq!(canonical_pair("b", "a"), ("a", "b"));
        assert_eq!(canonical_pair("a", "b"), ("a", "b"));
        assert_eq!(canonical_pair("x", "x"), ("x", "x"));
    }

    #[test]
    fn test_only_related_to_is_symmetric() {
        assert!(LinkType::RelatedTo.is_symmetric());
        assert!(!LinkType::Supersedes.is_symmetric());
        assert!(!LinkType::DependsOn.is_symmetric());
    }
}
