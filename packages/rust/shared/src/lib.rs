//! Shared types, error model, and configuration for DocForge.
//!
//! This crate is the foundation depended on by all other DocForge crates.
//! It provides:
//! - [`DocForgeError`], the unified error type
//! - Domain types ([`Document`], [`Metadata`], [`EnhancementResult`],
//!   [`ChunkSpec`], [`Chunk`], [`RunId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CollaboratorConfig, IndexConfig, PipelineConfig, SearchConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{DocForgeError, Result};
pub use types::{
    AgentStats, Chunk, ChunkSpec, ChunkStrategy, Document, EnhancementResult, FieldValue, Heading,
    INDEX_SCHEMA_VERSION, KEY_AUDIENCE, KEY_CHUNK_ANCHORS, KEY_CHUNK_BRIDGES, KEY_CHUNK_OVERLAP,
    KEY_CHUNK_SIZE, KEY_CHUNK_STRATEGY, KEY_CHUNK_TOTAL, KEY_CONTENT_TYPE, KEY_DESCRIPTION,
    KEY_DIFFICULTY, KEY_ENHANCED_AT, KEY_ENHANCED_BY, KEY_ENHANCEMENT_MODE, KEY_KEYWORDS,
    KEY_QUALITY_SCORE, KEY_RAG_SCORE, KEY_SEARCH_PRIORITY, KEY_TAGS, KEY_TOPIC, Metadata, RunId,
    SideArtifact, content_hash,
};
