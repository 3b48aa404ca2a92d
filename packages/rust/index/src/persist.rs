//! Validation and publication of index files.
//!
//! Three files are published per rebuild: the full index, a stats-only
//! view, and a keyword-index-only view. Old files are removed before the
//! new set is written; a rebuild never merges with a prior run. Validation
//! runs first and a failure blocks publishing entirely.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, instrument};

use docforge_shared::{AgentStats, DocForgeError, INDEX_SCHEMA_VERSION, Result};

use crate::types::{ChunkingStats, IndexAnalytics, IndexMetadata, KeywordEntry, SearchIndex};

pub const INDEX_FILE: &str = "search-index.json";
pub const STATS_FILE: &str = "search-stats.json";
pub const KEYWORD_FILE: &str = "keyword-index.json";

#[derive(Debug)]
pub struct PublishedFiles {
    pub index: PathBuf,
    pub stats: PathBuf,
    pub keywords: PathBuf,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsDocument<'a> {
    metadata: &'a IndexMetadata,
    analytics: &'a IndexAnalytics,
    chunking_stats: &'a ChunkingStats,
    agent_stats: &'a BTreeMap<String, AgentStats>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KeywordDocument<'a> {
    metadata: &'a IndexMetadata,
    keyword_index: &'a BTreeMap<String, Vec<KeywordEntry>>,
}

/// Structural checks on a built index. A broken index silently breaks all
/// search, so any failure here is fatal and blocks publishing.
pub fn validate_index(index: &SearchIndex) -> Result<()> {
    if index.metadata.schema_version != INDEX_SCHEMA_VERSION {
        return Err(DocForgeError::index_validation(format!(
            "schema version {} does not match expected {INDEX_SCHEMA_VERSION}",
            index.metadata.schema_version
        )));
    }

    let mut ids: HashSet<&str> = HashSet::with_capacity(index.documents.len());
    for document in &index.documents {
        if document.id.is_empty() {
            return Err(DocForgeError::index_validation(format!(
                "document at path {} has an empty id",
                document.path
            )));
        }
        if !ids.insert(document.id.as_str()) {
            return Err(DocForgeError::index_validation(format!(
                "duplicate document id: {}",
                document.id
            )));
        }
    }

    if index.analytics.total_documents != index.documents.len() {
        return Err(DocForgeError::index_validation(format!(
            "analytics claim {} documents but the index holds {}",
            index.analytics.total_documents,
            index.documents.len()
        )));
    }

    for (term, entries) in &index.search_indices.keyword_index {
        for entry in entries {
            if !ids.contains(entry.doc_id.as_str()) {
                return Err(DocForgeError::index_validation(format!(
                    "keyword '{term}' references unknown document {}",
                    entry.doc_id
                )));
            }
        }
    }
    for (tag, entry) in &index.search_indices.tag_index {
        for tagged in &entry.documents {
            if !ids.contains(tagged.doc_id.as_str()) {
                return Err(DocForgeError::index_validation(format!(
                    "tag '{tag}' references unknown document {}",
                    tagged.doc_id
                )));
            }
        }
    }
    for (facet, map) in [
        ("difficulty", &index.search_indices.faceted_index.difficulty),
        ("contentType", &index.search_indices.faceted_index.content_type),
        ("topic", &index.search_indices.faceted_index.topic),
        ("audience", &index.search_indices.faceted_index.audience),
    ] {
        for (value, doc_ids) in map {
            for doc_id in doc_ids {
                if !ids.contains(doc_id.as_str()) {
                    return Err(DocForgeError::index_validation(format!(
                        "facet {facet}={value} references unknown document {doc_id}"
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Validate and write all three index files, replacing any previous set.
#[instrument(skip_all, fields(output_dir = %output_dir.display()))]
pub fn publish(index: &SearchIndex, output_dir: &Path) -> Result<PublishedFiles> {
    validate_index(index)?;

    fs::create_dir_all(output_dir).map_err(|e| DocForgeError::io(output_dir, e))?;
    for name in [INDEX_FILE, STATS_FILE, KEYWORD_FILE] {
        let path = output_dir.join(name);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| DocForgeError::io(&path, e))?;
        }
    }

    let files = PublishedFiles {
        index: write_json(output_dir, INDEX_FILE, index)?,
        stats: write_json(
            output_dir,
            STATS_FILE,
            &StatsDocument {
                metadata: &index.metadata,
                analytics: &index.analytics,
                chunking_stats: &index.chunking_stats,
                agent_stats: &index.agent_stats,
            },
        )?,
        keywords: write_json(
            output_dir,
            KEYWORD_FILE,
            &KeywordDocument {
                metadata: &index.metadata,
                keyword_index: &index.search_indices.keyword_index,
            },
        )?,
    };

    info!(
        documents = index.documents.len(),
        keywords = index.search_indices.keyword_index.len(),
        "published search index"
    );
    Ok(files)
}

/// Load a previously published index.
pub fn load_index(path: &Path) -> Result<SearchIndex> {
    let raw = fs::read_to_string(path).map_err(|e| DocForgeError::io(path, e))?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    let path = dir.join(name);
    let json = serde_json::to_string_pretty(value)?;
    let tmp = dir.join(format!(".{name}.tmp"));
    fs::write(&tmp, json).map_err(|e| DocForgeError::io(&tmp, e))?;
    fs::rename(&tmp, &path).map_err(|e| DocForgeError::io(&path, e))?;
    Ok(path)
}
