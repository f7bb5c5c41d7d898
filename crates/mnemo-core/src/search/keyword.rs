//! Keyword query preparation
//!
//! User queries reach the FTS layer as an OR of quoted terms. Sanitization
//! strips every operator the full-text engine would otherwise interpret, so
//! a hostile or merely awkward query can never change the query shape.

/// Strip FTS operators and syntax characters, collapsing runs of whitespace.
pub fn sanitize_fts_query(query: &str) -> String {
    let mut cleaned = String::with_capacity(query.len());
    for c in query.chars() {
        match c {
            '"' | '*' | '+' | '-' | '^' | ':' | '(' | ')' | '{' | '}' => cleaned.push(' '),
            _ => cleaned.push(c),
        }
    }

    cleaned
        .split_whitespace()
        .filter(|token| {
            !matches!(
                token.to_uppercase().as_str(),
                "NOT" | "AND" | "OR" | "NEAR"
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the MATCH expression: an OR of quoted terms of length >= 2.
/// Returns `None` when nothing survives sanitization - callers translate
/// that into an empty result rather than an error.
pub fn build_match_query(query: &str) -> Option<String> {
    let sanitized = sanitize_fts_query(query);
    let terms: Vec<String> = sanitized
        .split_whitespace()
        .filter(|t| t.chars().count() >= 2)
        .map(|t| format!("\"{}\"", t))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_operators() {
        assert_eq!(sanitize_fts_query("hello world"), "hello world");
        assert_eq!(sanitize_fts_query("hello* OR world"), "hello world");
        assert_eq!(sanitize_fts_query("\"exact match\""), "exact match");
        assert_eq!(sanitize_fts_query("col:value NOT (a AND b)"), "col value a b");
    }

    #[test]
    fn test_build_match_query_quotes_terms() {
        assert_eq!(
            build_match_query("postgres migration").as_deref(),
            Some("\"postgres\" OR \"migration\"")
        );
    }

    #[test]
    fn test_build_match_query_drops_short_terms() {
        assert_eq!(build_match_query("a db").as_deref(), Some("\"db\""));
    }

    #[test]
    fn test_empty_and_operator_only_queries() {
        assert!(build_match_query("").is_none());
        assert!(build_match_query("AND OR NOT * ( )").is_none());
        assert!(build_match_query("  \"  ").is_none());
    }
}
