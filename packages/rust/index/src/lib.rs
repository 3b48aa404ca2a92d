//! Search index construction and persistence.
//!
//! [`IndexBuilder`] turns the full enhanced document set into a
//! [`SearchIndex`]; [`publish`] validates it and writes the three index
//! files (full, stats-only, keyword-only) atomically into the output
//! directory. Every rebuild is wholesale; nothing is merged from a prior
//! run.

pub mod builder;
pub mod persist;
pub mod types;

pub use builder::{CONTENT_WEIGHT, IndexBuilder, KEYWORD_WEIGHT, TITLE_WEIGHT};
pub use persist::{
    INDEX_FILE, KEYWORD_FILE, PublishedFiles, STATS_FILE, load_index, publish, validate_index,
};
pub use types::{
    ChunkSummary, ChunkingStats, FacetedIndex, IndexAnalytics, IndexMetadata, IndexedDocument,
    KeywordEntry, SearchFeatures, SearchIndex, SearchIndexConfig, SearchIndices, SourceKind,
    TagDocEntry, TagEntry, Taxonomies,
};
