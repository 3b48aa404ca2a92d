//! Runtime search over a loaded index.
//!
//! Queries run in two stages: a cheap existence filter over keywords,
//! title, description, and content, then weighted scoring of the
//! survivors. Enhanced documents additionally get semantic expansion
//! through the [`Lexicon`]. The engine is stateless per call and never
//! mutates the index, so queries can run concurrently.

use serde::Serialize;
use tracing::{debug, instrument};

use docforge_index::{IndexedDocument, SearchIndex};

pub mod lexicon;

pub use lexicon::Lexicon;

// Direct-hit weights, in descending order of trust.
const TITLE_HIT: f64 = 10.0;
const DESCRIPTION_HIT: f64 = 6.0;
const CONTENT_HIT: f64 = 3.0;
const KEYWORD_HIT: f64 = 2.0;

// Semantic-expansion weights, diminishing by zone.
const SEMANTIC_KEYWORD_HIT: f64 = 2.5;
const SEMANTIC_TITLE_HIT: f64 = 1.5;
const SEMANTIC_DESCRIPTION_HIT: f64 = 1.0;

const ENHANCED_BONUS: f64 = 1.0;
const RAG_BONUS_MAX: f64 = 2.0;

const EXCERPT_BEFORE: usize = 50;
const EXCERPT_AFTER: usize = 100;
const EXCERPT_FALLBACK: usize = 150;

/// Per-query options.
#[derive(Debug, Clone, Copy)]
pub struct SearchContext {
    pub max_results: usize,
    pub show_semantic: bool,
}

impl Default for SearchContext {
    fn default() -> Self {
        Self {
            max_results: 10,
            show_semantic: true,
        }
    }
}

/// One ranked hit. Lives only for the duration of a query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub doc_id: String,
    pub title: String,
    pub path: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    pub enhanced: bool,
    pub relevance_score: f64,
    pub matched_keywords: Vec<String>,
    pub semantic_matches: Vec<String>,
    pub excerpt: String,
}

pub struct SearchEngine {
    index: SearchIndex,
    lexicon: Lexicon,
}

impl SearchEngine {
    pub fn new(index: SearchIndex) -> Self {
        Self {
            index,
            lexicon: Lexicon::builtin(),
        }
    }

    pub fn with_lexicon(mut self, lexicon: Lexicon) -> Self {
        self.lexicon = lexicon;
        self
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    /// Rank documents for a query. Empty and whitespace-only queries
    /// return an empty list without touching either stage.
    #[instrument(skip_all, fields(query = %query))]
    pub fn search(&self, query: &str, context: &SearchContext) -> Vec<SearchResult> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let candidates = self.stage1(&needle);
        debug!(candidates = candidates.len(), "stage 1 filter complete");

        let mut results: Vec<SearchResult> = candidates
            .into_iter()
            .filter_map(|doc| self.score(doc, &needle, context))
            .collect();

        // Stable sort: ties keep index (document id) order.
        results.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        results.truncate(context.max_results);
        results
    }

    fn stage1(&self, needle: &str) -> Vec<&IndexedDocument> {
        self.index
            .documents
            .iter()
            .filter(|doc| passes_stage1(doc, needle))
            .collect()
    }

    fn score(
        &self,
        doc: &IndexedDocument,
        needle: &str,
        context: &SearchContext,
    ) -> Option<SearchResult> {
        let title = doc.title.to_lowercase();
        let description = doc.description.to_lowercase();
        let content = doc.content.to_lowercase();

        let mut score = 0.0;
        if title.contains(needle) {
            score += TITLE_HIT;
        }
        if !description.is_empty() && description.contains(needle) {
            score += DESCRIPTION_HIT;
        }
        if content.contains(needle) {
            score += CONTENT_HIT;
        }

        let mut matched_keywords: Vec<String> = doc
            .keywords
            .iter()
            .filter(|k| substring_either_way(k, needle))
            .cloned()
            .collect();
        if doc.enhanced {
            for tag in &doc.tags {
                if substring_either_way(tag, needle) && !matched_keywords.contains(tag) {
                    matched_keywords.push(tag.clone());
                }
            }
        }
        score += KEYWORD_HIT * matched_keywords.len() as f64;

        let mut semantic_matches: Vec<String> = Vec::new();
        if doc.enhanced && context.show_semantic {
            for related in self.lexicon.expand(needle) {
                let bonus = if doc.keywords.iter().any(|k| k.contains(related.as_str())) {
                    SEMANTIC_KEYWORD_HIT
                } else if title.contains(related.as_str()) {
                    SEMANTIC_TITLE_HIT
                } else if description.contains(related.as_str()) {
                    SEMANTIC_DESCRIPTION_HIT
                } else {
                    continue;
                };
                score += bonus;
                semantic_matches.push(related.clone());
            }
        }

        if doc.enhanced {
            score += ENHANCED_BONUS;
        }
        if let Some(rag) = doc.rag_score {
            score += RAG_BONUS_MAX * (rag / 100.0).clamp(0.0, 1.0);
        }
        if let Some(priority) = doc.search_priority {
            score += priority.max(0.0);
        }

        let score = round2(score * doc.relevance_weight);
        if score <= 0.0 {
            return None;
        }

        Some(SearchResult {
            doc_id: doc.id.clone(),
            title: doc.title.clone(),
            path: doc.path.clone(),
            description: doc.description.clone(),
            topic: doc.topic.clone(),
            difficulty: doc.difficulty.clone(),
            enhanced: doc.enhanced,
            relevance_score: score,
            matched_keywords,
            semantic_matches,
            excerpt: build_excerpt(&doc.content, needle),
        })
    }
}

fn passes_stage1(doc: &IndexedDocument, needle: &str) -> bool {
    if doc
        .keywords
        .iter()
        .any(|k| substring_either_way(k, needle))
    {
        return true;
    }
    if doc.title.to_lowercase().contains(needle)
        || doc.description.to_lowercase().contains(needle)
        || doc.content.to_lowercase().contains(needle)
    {
        return true;
    }
    // Enhanced documents also match through their curated tags.
    doc.enhanced && doc.tags.iter().any(|t| substring_either_way(t, needle))
}

/// True when either string contains the other. Index terms are stored
/// lowercased; `needle` arrives lowercased.
fn substring_either_way(term: &str, needle: &str) -> bool {
    term.contains(needle) || needle.contains(term)
}

/// Content window around the first (case-insensitive) query occurrence:
/// 50 chars before, 100 after, ellipsis-padded where truncated. Falls back
/// to the leading 150 chars when the query never appears verbatim.
fn build_excerpt(content: &str, needle: &str) -> String {
    let flat = content.replace('\n', " ");
    let chars: Vec<char> = flat.chars().collect();

    match find_case_insensitive(&flat, needle) {
        Some(byte_pos) => {
            let char_pos = flat[..byte_pos].chars().count();
            let start = char_pos.saturating_sub(EXCERPT_BEFORE);
            let end = (char_pos + EXCERPT_AFTER).min(chars.len());
            let mut excerpt: String = chars[start..end].iter().collect();
            if start > 0 {
                excerpt = format!("...{excerpt}");
            }
            if end < chars.len() {
                excerpt.push_str("...");
            }
            excerpt
        }
        None => {
            if chars.len() <= EXCERPT_FALLBACK {
                flat
            } else {
                let lead: String = chars[..EXCERPT_FALLBACK].iter().collect();
                format!("{lead}...")
            }
        }
    }
}

/// Byte offset of the first case-insensitive occurrence of `needle` in
/// `haystack`, comparing lowercased characters.
fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let target: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    let hay: Vec<(usize, char)> = haystack.char_indices().collect();

    for start in 0..hay.len() {
        let mut matched = 0;
        let mut pos = start;
        'window: while matched < target.len() && pos < hay.len() {
            for lowered in hay[pos].1.to_lowercase() {
                if matched >= target.len() || lowered != target[matched] {
                    break 'window;
                }
                matched += 1;
            }
            pos += 1;
        }
        if matched == target.len() {
            return Some(hay[start].0);
        }
    }
    None
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
