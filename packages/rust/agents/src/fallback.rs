//! Deterministic text heuristics backing every agent's fallback path.
//!
//! When the collaborator is disabled or its retry budget runs out, agents
//! still have to propose usable metadata. Everything in here is pure and
//! deterministic: the same document always yields the same keywords,
//! description, and tags.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use docforge_shared::Document;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z][A-Za-z0-9_-]{2,}").unwrap());

/// Words too common to carry meaning as keywords.
const STOPWORDS: &[&str] = &[
    "about", "after", "also", "and", "are", "because", "been", "before", "being", "between",
    "both", "but", "can", "could", "does", "doing", "during", "each", "for", "from", "has", "have",
    "having", "here", "how", "into", "its", "just", "like", "more", "most", "not", "only", "other",
    "our", "over", "should", "some", "such", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "those", "through", "under", "use", "used", "using", "very",
    "was", "were", "what", "when", "where", "which", "while", "will", "with", "within", "would",
    "you", "your",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Lowercased candidate tokens, stopwords and short words removed.
pub fn tokenize(text: &str) -> Vec<String> {
    WORD_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|token| token.len() > 3 && !is_stopword(token))
        .collect()
}

/// Keywords by term frequency over the body, with title tokens boosted so a
/// short document still surfaces its subject. Ties break alphabetically to
/// keep the output stable.
pub fn extract_keywords(document: &Document, max: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in tokenize(&document.body) {
        *counts.entry(token).or_insert(0) += 1;
    }
    for token in tokenize(&document.title) {
        *counts.entry(token).or_insert(0) += 3;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(max).map(|(token, _)| token).collect()
}

/// First prose paragraph of the body, squeezed onto one line and truncated
/// to `max_chars` at a word boundary. Headings, fenced code, and blank lines
/// are skipped until real prose starts.
pub fn derive_description(document: &Document, max_chars: usize) -> String {
    let paragraph = first_paragraph(&document.body);
    if paragraph.is_empty() {
        return format!("Documentation for {}.", document.title);
    }
    truncate_at_word(&paragraph, max_chars)
}

fn first_paragraph(body: &str) -> String {
    let mut in_fence = false;
    let mut collected: Vec<&str> = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if trimmed.is_empty() {
            if collected.is_empty() {
                continue;
            }
            break;
        }
        if trimmed.starts_with('#') {
            if collected.is_empty() {
                continue;
            }
            break;
        }
        collected.push(trimmed);
    }

    collected.join(" ")
}

/// Truncate at a word boundary, appending an ellipsis when text was dropped.
pub fn truncate_at_word(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let budget = max_chars.saturating_sub(3);
    let mut out = String::new();
    for word in text.split_whitespace() {
        let next_len = if out.is_empty() {
            word.chars().count()
        } else {
            out.chars().count() + 1 + word.chars().count()
        };
        if next_len > budget {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    if out.is_empty() {
        out = text.chars().take(budget).collect();
    }
    out.push_str("...");
    out
}
