//! Builds a [`SearchIndex`] from the full enhanced document set.
//!
//! The build is a wholesale rebuild: no state survives from a previous
//! index. Documents are processed in id order and every map section is a
//! `BTreeMap`, so identical input produces byte-identical output.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument};

use docforge_chunking::{MAX_CHUNK_SIZE, MAX_OVERLAP, MIN_CHUNK_SIZE, MIN_OVERLAP, compute_spec, materialize, total_chunks};
use docforge_shared::{
    AgentStats, ChunkSpec, ChunkStrategy, Document, INDEX_SCHEMA_VERSION, KEY_AUDIENCE,
    KEY_CHUNK_ANCHORS, KEY_CHUNK_BRIDGES, KEY_CHUNK_OVERLAP, KEY_CHUNK_SIZE, KEY_CHUNK_STRATEGY,
    KEY_CONTENT_TYPE, KEY_DESCRIPTION, KEY_DIFFICULTY, KEY_ENHANCEMENT_MODE, KEY_KEYWORDS,
    KEY_QUALITY_SCORE, KEY_RAG_SCORE, KEY_SEARCH_PRIORITY, KEY_TAGS, KEY_TOPIC,
};

use crate::types::{
    ChunkSummary, ChunkingStats, FacetedIndex, IndexAnalytics, IndexMetadata, IndexedDocument,
    KeywordEntry, SearchFeatures, SearchIndex, SearchIndexConfig, SearchIndices, SourceKind,
    TagDocEntry, TagEntry, Taxonomies,
};

/// Explicit keywords and tags dominate ranking; title words nudge it;
/// sampled body words only break ties.
pub const KEYWORD_WEIGHT: f64 = 1.0;
pub const TITLE_WEIGHT: f64 = 0.9;
pub const CONTENT_WEIGHT: f64 = 0.3;

const MAX_CONTENT_TERMS: usize = 50;
const MIN_TITLE_TERM_CHARS: usize = 3;
const MIN_CONTENT_TERM_CHARS: usize = 4;
const TAG_EXCERPT_CHARS: usize = 120;
const RECENCY_WINDOW_DAYS: i64 = 30;

pub struct IndexBuilder {
    search_config: SearchIndexConfig,
    agent_stats: BTreeMap<String, AgentStats>,
    now: Option<DateTime<Utc>>,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self {
            search_config: SearchIndexConfig::default(),
            agent_stats: BTreeMap::new(),
            now: None,
        }
    }

    pub fn with_search_config(mut self, config: SearchIndexConfig) -> Self {
        self.search_config = config;
        self
    }

    /// Fold per-agent stats from the latest pipeline run into the index.
    pub fn with_agent_stats(mut self, stats: BTreeMap<String, AgentStats>) -> Self {
        self.agent_stats = stats;
        self
    }

    /// Fix the build timestamp. Recency boosts and `generatedAt` use this
    /// instead of the wall clock.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    #[instrument(skip_all, fields(documents = documents.len()))]
    pub fn build(&self, documents: &[Document]) -> SearchIndex {
        let now = self.now.unwrap_or_else(Utc::now);

        let mut ordered: Vec<&Document> = documents.iter().collect();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));

        let mut indexed: Vec<IndexedDocument> = Vec::with_capacity(ordered.len());
        let mut keyword_index: BTreeMap<String, Vec<KeywordEntry>> = BTreeMap::new();
        let mut tag_index: BTreeMap<String, TagEntry> = BTreeMap::new();
        let mut faceted = FacetedIndex::default();
        let mut chunking_stats = ChunkingStats::default();
        let mut chunk_word_total: usize = 0;

        for document in ordered {
            let spec = chunk_spec_for(document);
            let view = index_document(document, &spec, now);

            index_keywords(&mut keyword_index, &view, &document.body);
            index_tags(&mut tag_index, document, &view);
            index_facets(&mut faceted, &view);

            chunking_stats.total_chunks += view.chunks.len();
            for chunk in &view.chunks {
                let content = &document.body[chunk.start_offset..chunk.end_offset];
                chunk_word_total += content.split_whitespace().count();
            }
            *chunking_stats
                .strategies
                .entry(spec.strategy.as_str().to_string())
                .or_insert(0) += 1;

            debug!(id = %view.id, chunks = view.chunks.len(), "indexed document");
            indexed.push(view);
        }

        chunking_stats.average_chunk_size = if chunking_stats.total_chunks == 0 {
            0.0
        } else {
            round2(chunk_word_total as f64 / chunking_stats.total_chunks as f64)
        };

        let taxonomies = Taxonomies {
            topics: faceted.topic.keys().cloned().collect(),
            difficulties: faceted.difficulty.keys().cloned().collect(),
            audiences: faceted.audience.keys().cloned().collect(),
            content_types: faceted.content_type.keys().cloned().collect(),
        };

        let analytics = compute_analytics(&indexed, &keyword_index, &tag_index, &chunking_stats);

        SearchIndex {
            metadata: IndexMetadata {
                schema_version: INDEX_SCHEMA_VERSION,
                generated_at: now,
                generator: format!("docforge {}", env!("CARGO_PKG_VERSION")),
            },
            search_config: self.search_config.clone(),
            taxonomies,
            agent_stats: self.agent_stats.clone(),
            chunking_stats,
            documents: indexed,
            search_indices: SearchIndices {
                keyword_index,
                tag_index,
                faceted_index: faceted,
            },
            search_features: SearchFeatures::default(),
            analytics,
        }
    }
}

fn index_document(document: &Document, spec: &ChunkSpec, now: DateTime<Utc>) -> IndexedDocument {
    let metadata = &document.metadata;
    let enhanced = document.is_enhanced();

    let keywords = lowercase_distinct(metadata.get_list(KEY_KEYWORDS));
    let tags = lowercase_distinct(metadata.get_list(KEY_TAGS));

    let chunks: Vec<ChunkSummary> = materialize(document, spec)
        .into_iter()
        .map(|chunk| ChunkSummary {
            id: chunk.id,
            anchor: chunk.anchor,
            bridge: chunk.bridge,
            start_offset: chunk.start_offset,
            end_offset: chunk.end_offset,
            vector_keywords: chunk.vector_keywords,
        })
        .collect();

    IndexedDocument {
        id: document.id.clone(),
        title: document.title.clone(),
        path: document.source_path.clone(),
        description: metadata
            .get_scalar(KEY_DESCRIPTION)
            .unwrap_or_default()
            .to_string(),
        keywords,
        tags,
        topic: metadata.get_scalar(KEY_TOPIC).map(str::to_string),
        difficulty: metadata.get_scalar(KEY_DIFFICULTY).map(str::to_string),
        audience: metadata.get_scalar(KEY_AUDIENCE).map(str::to_string),
        content_type: metadata.get_scalar(KEY_CONTENT_TYPE).map(str::to_string),
        word_count: document.word_count,
        enhanced,
        enhancement_mode: metadata
            .get_scalar(KEY_ENHANCEMENT_MODE)
            .map(str::to_string),
        quality_score: parse_score(metadata.get_scalar(KEY_QUALITY_SCORE)),
        rag_score: parse_score(metadata.get_scalar(KEY_RAG_SCORE)),
        search_priority: parse_score(metadata.get_scalar(KEY_SEARCH_PRIORITY)),
        relevance_weight: relevance_weight(document, enhanced, now),
        content: document.body.clone(),
        chunks,
        modified_at: document.modified_at,
    }
}

/// Lowercase and keep first occurrence, preserving order.
fn lowercase_distinct(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        let lowered = value.to_lowercase();
        if !lowered.is_empty() && !out.contains(&lowered) {
            out.push(lowered);
        }
    }
    out
}

/// Chunk spec for index time: the spec the chunking agent recorded in
/// metadata when present and sane, else computed fresh from structure.
fn chunk_spec_for(document: &Document) -> ChunkSpec {
    let mut spec = compute_spec(document);
    let metadata = &document.metadata;

    let strategy = metadata
        .get_scalar(KEY_CHUNK_STRATEGY)
        .and_then(|s| s.parse::<ChunkStrategy>().ok());
    let size = metadata
        .get_scalar(KEY_CHUNK_SIZE)
        .and_then(|s| s.parse::<usize>().ok());
    let overlap = metadata
        .get_scalar(KEY_CHUNK_OVERLAP)
        .and_then(|s| s.parse::<usize>().ok());

    if let (Some(strategy), Some(size), Some(overlap)) = (strategy, size, overlap) {
        spec.strategy = strategy;
        spec.size = size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        spec.overlap = overlap.clamp(MIN_OVERLAP, MAX_OVERLAP);
        let anchors = metadata.get_list(KEY_CHUNK_ANCHORS);
        if !anchors.is_empty() {
            spec.anchors = anchors;
        }
        let bridges = metadata.get_list(KEY_CHUNK_BRIDGES);
        if !bridges.is_empty() {
            spec.bridges = bridges;
        }
        spec.total_chunks = total_chunks(document.word_count, spec.size, spec.overlap);
    }
    spec
}

/// `1.0 + 0.1*keywords + 0.05*tags + 0.3 if enhanced + min(words/1000, 0.5)
/// + 0.2 if modified in the last 30 days`, rounded to 2 decimals.
fn relevance_weight(document: &Document, enhanced: bool, now: DateTime<Utc>) -> f64 {
    let keyword_count = document.metadata.get_list(KEY_KEYWORDS).len();
    let tag_count = document.metadata.get_list(KEY_TAGS).len();

    let mut weight = 1.0
        + 0.1 * keyword_count as f64
        + 0.05 * tag_count as f64
        + (document.word_count as f64 / 1000.0).min(0.5);
    if enhanced {
        weight += 0.3;
    }
    if let Some(modified) = document.modified_at {
        if now.signed_duration_since(modified) <= Duration::days(RECENCY_WINDOW_DAYS) {
            weight += 0.2;
        }
    }
    round2(weight)
}

fn index_keywords(
    index: &mut BTreeMap<String, Vec<KeywordEntry>>,
    view: &IndexedDocument,
    body: &str,
) {
    let mut explicit: Vec<String> = Vec::new();
    for term in view.keywords.iter().chain(view.tags.iter()) {
        if !explicit.contains(term) {
            explicit.push(term.clone());
        }
    }
    for term in explicit {
        push_entry(index, term, &view.id, SourceKind::Keyword, KEYWORD_WEIGHT);
    }

    let mut title_terms: Vec<String> = Vec::new();
    for raw in view.title.split_whitespace() {
        if let Some(term) = normalize_term(raw) {
            if term.chars().count() >= MIN_TITLE_TERM_CHARS && !title_terms.contains(&term) {
                title_terms.push(term);
            }
        }
    }
    for term in title_terms {
        push_entry(index, term, &view.id, SourceKind::Title, TITLE_WEIGHT);
    }

    let mut content_terms: Vec<String> = Vec::new();
    for raw in body.split_whitespace() {
        if content_terms.len() == MAX_CONTENT_TERMS {
            break;
        }
        if let Some(term) = normalize_term(raw) {
            if term.chars().count() >= MIN_CONTENT_TERM_CHARS && !content_terms.contains(&term) {
                content_terms.push(term);
            }
        }
    }
    for term in content_terms {
        push_entry(index, term, &view.id, SourceKind::Content, CONTENT_WEIGHT);
    }
}

fn push_entry(
    index: &mut BTreeMap<String, Vec<KeywordEntry>>,
    term: String,
    doc_id: &str,
    source_kind: SourceKind,
    weight: f64,
) {
    index.entry(term).or_default().push(KeywordEntry {
        doc_id: doc_id.to_string(),
        source_kind,
        weight,
    });
}

/// Strip surrounding punctuation and lowercase; drop terms that do not
/// start with a letter.
fn normalize_term(raw: &str) -> Option<String> {
    let trimmed = raw.trim_matches(|c: char| !c.is_alphanumeric());
    let first = trimmed.chars().next()?;
    if !first.is_alphabetic() {
        return None;
    }
    Some(trimmed.to_lowercase())
}

fn index_tags(index: &mut BTreeMap<String, TagEntry>, document: &Document, view: &IndexedDocument) {
    // Tag display casing comes from the raw metadata; the first one seen
    // wins across the (id-ordered) document set.
    let raw_tags = document.metadata.get_list(KEY_TAGS);

    for raw in raw_tags {
        let key = raw.to_lowercase();
        let entry = index.entry(key).or_insert_with(|| TagEntry {
            display_name: raw.clone(),
            documents: Vec::new(),
        });
        if entry.documents.iter().any(|d| d.doc_id == view.id) {
            continue;
        }
        entry.documents.push(TagDocEntry {
            doc_id: view.id.clone(),
            excerpt: short_excerpt(view),
        });
    }
}

fn short_excerpt(view: &IndexedDocument) -> String {
    if !view.description.is_empty() {
        return view.description.clone();
    }
    let content: String = view.content.chars().take(TAG_EXCERPT_CHARS).collect();
    if view.content.chars().count() > TAG_EXCERPT_CHARS {
        format!("{content}...")
    } else {
        content
    }
}

fn index_facets(faceted: &mut FacetedIndex, view: &IndexedDocument) {
    for (facet, map) in [
        (&view.difficulty, &mut faceted.difficulty),
        (&view.content_type, &mut faceted.content_type),
        (&view.topic, &mut faceted.topic),
        (&view.audience, &mut faceted.audience),
    ] {
        if let Some(value) = facet {
            let key = value.to_lowercase();
            if !key.is_empty() {
                map.entry(key).or_default().push(view.id.clone());
            }
        }
    }
}

fn compute_analytics(
    documents: &[IndexedDocument],
    keyword_index: &BTreeMap<String, Vec<KeywordEntry>>,
    tag_index: &BTreeMap<String, TagEntry>,
    chunking_stats: &ChunkingStats,
) -> IndexAnalytics {
    let total_documents = documents.len();
    let total_words: usize = documents.iter().map(|d| d.word_count).sum();
    let enhanced_documents = documents.iter().filter(|d| d.enhanced).count();
    let fallback_documents = documents
        .iter()
        .filter(|d| d.enhancement_mode.as_deref() == Some("fallback"))
        .count();

    let scored: Vec<f64> = documents.iter().filter_map(|d| d.quality_score).collect();
    let average_quality_score = if scored.is_empty() {
        0.0
    } else {
        round2(scored.iter().sum::<f64>() / scored.len() as f64)
    };
    let average_word_count = if total_documents == 0 {
        0.0
    } else {
        round2(total_words as f64 / total_documents as f64)
    };

    IndexAnalytics {
        total_documents,
        enhanced_documents,
        fallback_documents,
        total_words,
        average_word_count,
        average_quality_score,
        distinct_keywords: keyword_index.len(),
        distinct_tags: tag_index.len(),
        total_chunks: chunking_stats.total_chunks,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
