//! Core domain types for the DocForge enhancement pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Current schema version for the persisted index format.
pub const INDEX_SCHEMA_VERSION: u32 = 1;

// Metadata keys shared across the pipeline, index builder, and search engine.
pub const KEY_DESCRIPTION: &str = "description";
pub const KEY_KEYWORDS: &str = "keywords";
pub const KEY_TAGS: &str = "tags";
pub const KEY_ENHANCED_BY: &str = "enhanced_by";
pub const KEY_ENHANCED_AT: &str = "enhanced_at";
pub const KEY_ENHANCEMENT_MODE: &str = "enhancement_mode";
pub const KEY_QUALITY_SCORE: &str = "quality_score";
pub const KEY_RAG_SCORE: &str = "rag_score";
pub const KEY_SEARCH_PRIORITY: &str = "search_priority";

// Facet keys written by the taxonomy agent, read by the index builder.
pub const KEY_TOPIC: &str = "topic";
pub const KEY_DIFFICULTY: &str = "difficulty";
pub const KEY_AUDIENCE: &str = "audience";
pub const KEY_CONTENT_TYPE: &str = "content_type";

// Chunk spec keys written by the chunking agent, read back at index time.
pub const KEY_CHUNK_STRATEGY: &str = "chunk_strategy";
pub const KEY_CHUNK_SIZE: &str = "chunk_size";
pub const KEY_CHUNK_OVERLAP: &str = "chunk_overlap";
pub const KEY_CHUNK_TOTAL: &str = "chunk_total";
pub const KEY_CHUNK_ANCHORS: &str = "chunk_anchors";
pub const KEY_CHUNK_BRIDGES: &str = "chunk_bridges";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// A single frontmatter value: a scalar string or a list of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Borrow the scalar value, if this is one.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::List(_) => None,
        }
    }

    /// Borrow the list items, if this is a list.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::Scalar(_) => None,
            Self::List(items) => Some(items),
        }
    }

    /// Render the value for human-readable output (lists comma-joined).
    pub fn display_string(&self) -> String {
        match self {
            Self::Scalar(s) => s.clone(),
            Self::List(items) => items.join(", "),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Scalar(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Scalar(s)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

/// Ordered key→value metadata map with unique keys.
///
/// Insertion order is preserved; re-inserting an existing key replaces its
/// value in place. Serializes as a JSON map in entry order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    entries: Vec<(String, FieldValue)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Scalar value of `key`, if present and scalar.
    pub fn get_scalar(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_scalar)
    }

    /// List items of `key`. A scalar value is treated as a one-item list.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(FieldValue::List(items)) => items.clone(),
            Some(FieldValue::Scalar(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Insert or replace `key`. Existing keys keep their position; new keys
    /// append at the end.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, FieldValue)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        let mut metadata = Metadata::new();
        for (key, value) in iter {
            metadata.insert(key, value);
        }
        metadata
    }
}

impl Serialize for Metadata {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct MetadataVisitor;

        impl<'de> serde::de::Visitor<'de> for MetadataVisitor {
            type Value = Metadata;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of metadata fields")
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: serde::de::MapAccess<'de>,
            {
                let mut metadata = Metadata::new();
                while let Some((key, value)) = access.next_entry::<String, FieldValue>()? {
                    metadata.insert(key, value);
                }
                Ok(metadata)
            }
        }

        deserializer.deserialize_map(MetadataVisitor)
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A heading within a document body, with the word count of its section
/// (text between this heading and the next).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
    pub word_count: usize,
}

/// A loaded markdown document: frontmatter metadata plus structural facts
/// about the body.
///
/// Owned exclusively by the pipeline during a run. Agents receive an
/// immutable snapshot and return a delta ([`EnhancementResult`]); they never
/// mutate the document directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier derived from the source path (kebab-case slug).
    pub id: String,
    /// Display title (frontmatter `title`, first H1, or filename).
    pub title: String,
    /// Source file path relative to the document root.
    pub source_path: String,
    /// Body text with the frontmatter stripped.
    pub body: String,
    /// Ordered frontmatter metadata.
    pub metadata: Metadata,
    /// Body word count, code fences excluded.
    pub word_count: usize,
    /// Ordered headings with per-section word counts.
    pub headings: Vec<Heading>,
    /// Number of fenced code blocks in the body.
    pub code_block_count: usize,
    /// Number of list items in the body.
    pub list_item_count: usize,
    /// SHA-256 of the body.
    pub content_hash: String,
    /// Filesystem mtime of the source file, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Pipeline identifier recorded by the last enhancement run, if any.
    pub fn enhanced_by(&self) -> Option<&str> {
        self.metadata.get_scalar(KEY_ENHANCED_BY)
    }

    /// Timestamp recorded by the last enhancement run, if any and parseable.
    pub fn enhanced_at(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .get_scalar(KEY_ENHANCED_AT)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Whether any enhancement run has stamped this document.
    pub fn is_enhanced(&self) -> bool {
        self.enhanced_by().is_some()
    }
}

/// SHA-256 hex digest of a document body.
pub fn content_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// EnhancementResult
// ---------------------------------------------------------------------------

/// A named text blob produced alongside an agent's metadata delta
/// (e.g. the validation agent's human-readable log). Never merged into the
/// document body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideArtifact {
    pub name: String,
    pub content: String,
}

/// Per-agent aggregates for one pipeline run. Written into the run report
/// and folded into the persisted search index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStats {
    pub invocations: u64,
    pub failures: u64,
    pub fallbacks: u64,
    pub total_duration_ms: u64,
    pub mean_score: f64,
}

/// One agent's proposed delta for a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancementResult {
    /// Metadata additions/updates to merge into the document.
    pub proposed_metadata: Metadata,
    /// Human-readable change descriptions, in the order applied.
    pub improvements: Vec<String>,
    /// Quality signal in [0, 100]; semantics depend on the agent.
    pub quality_score: f64,
    /// True when the result came from deterministic heuristics rather than
    /// the external collaborator.
    pub used_fallback: bool,
    /// Optional side output (validation log etc.).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_artifact: Option<SideArtifact>,
}

impl EnhancementResult {
    /// An empty result carrying only a score, for agents with nothing to add.
    pub fn empty(quality_score: f64) -> Self {
        Self {
            proposed_metadata: Metadata::new(),
            improvements: Vec::new(),
            quality_score,
            used_fallback: false,
            side_artifact: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Chunking
// ---------------------------------------------------------------------------

/// How a document body is segmented for retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    /// Split on meaning shifts; for bodies with high section-length variance.
    Semantic,
    /// Split on headings; for regular, evenly sectioned bodies.
    Structural,
    /// Mix of both.
    Hybrid,
}

impl ChunkStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Structural => "structural",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChunkStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "semantic" => Ok(Self::Semantic),
            "structural" => Ok(Self::Structural),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown chunk strategy: {other}")),
        }
    }
}

/// Segmentation parameters computed from a document's structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSpec {
    pub strategy: ChunkStrategy,
    /// Chunk size in words, within [200, 800].
    pub size: usize,
    /// Overlap between consecutive chunks in words, within [20, 150].
    pub overlap: usize,
    /// Boundary kinds present in the body (headings, code blocks, lists...).
    pub boundaries: Vec<String>,
    /// One slugified label per heading.
    pub anchors: Vec<String>,
    /// Transition labels between adjacent major sections.
    pub bridges: Vec<String>,
    /// max(1, ceil(word_count / (size - overlap))).
    pub total_chunks: usize,
}

/// A materialized retrieval unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// `{document-id}-{ordinal}`.
    pub id: String,
    pub content: String,
    /// Byte offset into the document body (inclusive).
    pub start_offset: usize,
    /// Byte offset into the document body (exclusive).
    pub end_offset: usize,
    /// Slug of the nearest preceding heading, or the document id.
    pub anchor: String,
    /// Transition label, when the chunk starts a new major section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
    /// Up to a handful of the document's keywords found in this chunk.
    pub vector_keywords: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn metadata_preserves_insertion_order() {
        let mut metadata = Metadata::new();
        metadata.insert("title", "Guide");
        metadata.insert("tags", vec!["a".to_string(), "b".to_string()]);
        metadata.insert("author", "ops");

        let keys: Vec<&str> = metadata.keys().collect();
        assert_eq!(keys, vec!["title", "tags", "author"]);

        // Replacing a value keeps the key's position.
        metadata.insert("tags", vec!["c".to_string()]);
        let keys: Vec<&str> = metadata.keys().collect();
        assert_eq!(keys, vec!["title", "tags", "author"]);
        assert_eq!(metadata.get_list("tags"), vec!["c".to_string()]);
    }

    #[test]
    fn metadata_serde_roundtrip_keeps_order() {
        let mut metadata = Metadata::new();
        metadata.insert("zebra", "last alphabetically, first inserted");
        metadata.insert("keywords", vec!["auth".to_string(), "tokens".to_string()]);
        metadata.insert("alpha", "first alphabetically, last inserted");

        let json = serde_json::to_string(&metadata).expect("serialize");
        // Entry order, not alphabetical order.
        assert!(json.find("zebra").unwrap() < json.find("keywords").unwrap());
        assert!(json.find("keywords").unwrap() < json.find("alpha").unwrap());

        let parsed: Metadata = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, metadata);
    }

    #[test]
    fn field_value_untagged_serde() {
        let scalar: FieldValue = serde_json::from_str("\"hello\"").expect("scalar");
        assert_eq!(scalar.as_scalar(), Some("hello"));

        let list: FieldValue = serde_json::from_str("[\"a\", \"b\"]").expect("list");
        assert_eq!(list.as_list().map(<[String]>::len), Some(2));
    }

    #[test]
    fn get_list_promotes_scalar() {
        let mut metadata = Metadata::new();
        metadata.insert("tags", "security");
        assert_eq!(metadata.get_list("tags"), vec!["security".to_string()]);
        assert!(metadata.get_list("missing").is_empty());
    }

    #[test]
    fn document_enhancement_accessors() {
        let mut metadata = Metadata::new();
        metadata.insert(KEY_ENHANCED_BY, "docforge-pipeline");
        metadata.insert(KEY_ENHANCED_AT, "2026-01-15T10:00:00+00:00");

        let doc = Document {
            id: "guide".into(),
            title: "Guide".into(),
            source_path: "guide.md".into(),
            body: "content".into(),
            metadata,
            word_count: 1,
            headings: vec![],
            code_block_count: 0,
            list_item_count: 0,
            content_hash: content_hash("content"),
            modified_at: None,
        };

        assert_eq!(doc.enhanced_by(), Some("docforge-pipeline"));
        assert!(doc.enhanced_at().is_some());
        assert!(doc.is_enhanced());
    }

    #[test]
    fn chunk_strategy_roundtrip() {
        for strategy in [
            ChunkStrategy::Semantic,
            ChunkStrategy::Structural,
            ChunkStrategy::Hybrid,
        ] {
            let parsed: ChunkStrategy = strategy.as_str().parse().expect("parse");
            assert_eq!(parsed, strategy);
        }
        assert!("freestyle".parse::<ChunkStrategy>().is_err());
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("abc").len(), 64);
    }
}
