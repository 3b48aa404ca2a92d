//! Semantic expansion table for stage-2 scoring.
//!
//! A compiled-in term → related-terms mapping. Deployments needing custom
//! vocabularies can hand the engine their own table via
//! [`Lexicon::from_pairs`]; lookups are exact-match on the lowercased
//! query either way.

use std::collections::HashMap;

const SEMANTIC_EXPANSIONS: &[(&str, &[&str])] = &[
    (
        "auth",
        &["authentication", "authorization", "login", "credentials"],
    ),
    ("authentication", &["auth", "login", "identity", "sso"]),
    (
        "security",
        &["authentication", "encryption", "vulnerability", "hardening"],
    ),
    ("deploy", &["deployment", "release", "rollout"]),
    ("deployment", &["deploy", "release", "infrastructure"]),
    ("config", &["configuration", "settings", "options"]),
    ("configuration", &["config", "settings", "environment"]),
    ("error", &["exception", "failure", "troubleshooting", "debug"]),
    ("database", &["storage", "persistence", "sql", "schema"]),
    ("cache", &["caching", "redis", "invalidation"]),
    ("api", &["endpoint", "rest", "interface", "request"]),
    ("test", &["testing", "coverage", "assertion", "fixture"]),
    (
        "monitor",
        &["monitoring", "observability", "metrics", "alerting"],
    ),
    (
        "performance",
        &["latency", "throughput", "optimization", "profiling"],
    ),
    ("search", &["query", "index", "ranking", "retrieval"]),
    ("install", &["installation", "setup", "prerequisites"]),
    ("token", &["tokens", "jwt", "session", "credentials"]),
    ("backup", &["restore", "snapshot", "recovery"]),
];

/// Deterministic term → related-terms mapping.
#[derive(Debug, Clone)]
pub struct Lexicon {
    entries: HashMap<String, Vec<String>>,
}

impl Lexicon {
    /// The compiled-in expansion table.
    pub fn builtin() -> Self {
        let entries = SEMANTIC_EXPANSIONS
            .iter()
            .map(|(term, related)| {
                (
                    (*term).to_string(),
                    related.iter().map(|r| (*r).to_string()).collect(),
                )
            })
            .collect();
        Self { entries }
    }

    /// A custom table; keys are lowercased on the way in.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
        let entries = pairs
            .into_iter()
            .map(|(term, related)| (term.to_lowercase(), related))
            .collect();
        Self { entries }
    }

    /// Related terms for a query, empty when the query is not in the table.
    pub fn expand(&self, query: &str) -> &[String] {
        self.entries
            .get(query.trim().to_lowercase().as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_expands_auth() {
        let lexicon = Lexicon::builtin();
        let related = lexicon.expand("auth");
        assert!(related.contains(&"authentication".to_string()));
    }

    #[test]
    fn lookup_is_case_insensitive_on_the_query() {
        let lexicon = Lexicon::builtin();
        assert_eq!(lexicon.expand("AUTH"), lexicon.expand("auth"));
    }

    #[test]
    fn unknown_terms_expand_to_nothing() {
        let lexicon = Lexicon::builtin();
        assert!(lexicon.expand("zymurgy").is_empty());
    }

    #[test]
    fn custom_tables_replace_the_builtin() {
        let lexicon = Lexicon::from_pairs(vec![(
            "Widget".to_string(),
            vec!["gadget".to_string()],
        )]);
        assert_eq!(lexicon.expand("widget"), ["gadget".to_string()]);
        assert!(lexicon.expand("auth").is_empty());
    }
}
