//! Persisted search index format.
//!
//! All structs here serialize with camelCase keys; the on-disk JSON is the
//! contract consumed by the runtime search engine and external tooling.
//! Map-valued sections use `BTreeMap` so rebuilds with identical input are
//! byte-identical.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use docforge_shared::AgentStats;

/// The complete persisted index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndex {
    pub metadata: IndexMetadata,
    pub search_config: SearchIndexConfig,
    pub taxonomies: Taxonomies,
    pub agent_stats: BTreeMap<String, AgentStats>,
    pub chunking_stats: ChunkingStats,
    pub documents: Vec<IndexedDocument>,
    pub search_indices: SearchIndices,
    pub search_features: SearchFeatures,
    pub analytics: IndexAnalytics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMetadata {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub generator: String,
}

/// Search defaults baked into the index at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndexConfig {
    pub default_max_results: usize,
    pub semantic_expansion: bool,
}

impl Default for SearchIndexConfig {
    fn default() -> Self {
        Self {
            default_max_results: 10,
            semantic_expansion: true,
        }
    }
}

/// Distinct facet values observed across the document set, sorted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Taxonomies {
    pub topics: Vec<String>,
    pub difficulties: Vec<String>,
    pub audiences: Vec<String>,
    pub content_types: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkingStats {
    pub total_chunks: usize,
    pub average_chunk_size: f64,
    pub strategies: BTreeMap<String, usize>,
}

/// One document as the search engine sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedDocument {
    pub id: String,
    pub title: String,
    pub path: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub word_count: usize,
    pub enhanced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhancement_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_priority: Option<f64>,
    /// Ranking boost from metadata richness, enhancement status, length,
    /// and recency. Rounded to 2 decimals.
    pub relevance_weight: f64,
    pub content: String,
    pub chunks: Vec<ChunkSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

/// A materialized chunk, trimmed to what retrieval consumers need.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkSummary {
    pub id: String,
    pub anchor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
    pub start_offset: usize,
    pub end_offset: usize,
    pub vector_keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndices {
    pub keyword_index: BTreeMap<String, Vec<KeywordEntry>>,
    pub tag_index: BTreeMap<String, TagEntry>,
    pub faceted_index: FacetedIndex,
}

/// One posting in the keyword index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordEntry {
    pub doc_id: String,
    pub source_kind: SourceKind,
    pub weight: f64,
}

/// Where a keyword posting came from. Explicit keywords outrank title
/// words, which outrank sampled content words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Keyword,
    Title,
    Content,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagEntry {
    /// Original casing of the first occurrence.
    pub display_name: String,
    pub documents: Vec<TagDocEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDocEntry {
    pub doc_id: String,
    pub excerpt: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetedIndex {
    pub difficulty: BTreeMap<String, Vec<String>>,
    pub content_type: BTreeMap<String, Vec<String>>,
    pub topic: BTreeMap<String, Vec<String>>,
    pub audience: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFeatures {
    pub semantic_expansion: bool,
    pub faceted_search: bool,
    pub chunk_retrieval: bool,
}

impl Default for SearchFeatures {
    fn default() -> Self {
        Self {
            semantic_expansion: true,
            faceted_search: true,
            chunk_retrieval: true,
        }
    }
}

/// Aggregate counts and averages over the indexed set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexAnalytics {
    pub total_documents: usize,
    pub enhanced_documents: usize,
    pub fallback_documents: usize,
    pub total_words: usize,
    pub average_word_count: f64,
    pub average_quality_score: f64,
    pub distinct_keywords: usize,
    pub distinct_tags: usize,
    pub total_chunks: usize,
}
