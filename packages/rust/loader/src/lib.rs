//! Document loading for DocForge.
//!
//! Discovers markdown files under a source directory, splits frontmatter
//! from body, and computes the structural facts the pipeline and index
//! builder work from. Writing goes through the same frontmatter layer so
//! untouched headers survive byte-for-byte.

pub mod frontmatter;
pub mod structure;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use docforge_shared::{DocForgeError, Document, Metadata, Result, content_hash};

pub use frontmatter::Frontmatter;
pub use structure::{DocumentStructure, scan_structure};

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Find all markdown files under `source_dir`, sorted by path for
/// deterministic batch ordering.
#[instrument(skip_all, fields(dir = %source_dir.display()))]
pub fn discover(source_dir: &Path) -> Result<Vec<PathBuf>> {
    if !source_dir.is_dir() {
        return Err(DocForgeError::discovery(format!(
            "source directory not found: {}",
            source_dir.display()
        )));
    }

    let mut files = Vec::new();
    collect_markdown(source_dir, &mut files)?;
    files.sort();

    debug!(count = files.len(), "discovered markdown files");
    Ok(files)
}

fn collect_markdown(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| DocForgeError::io(dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| DocForgeError::io(dir, e))?;
        let path = entry.path();

        if path.is_dir() {
            collect_markdown(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "md") {
            out.push(path);
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read and parse a single document. `root` anchors the relative
/// `source_path` and the derived id.
pub fn read_document(root: &Path, path: &Path) -> Result<Document> {
    let raw = std::fs::read_to_string(path).map_err(|e| DocForgeError::io(path, e))?;

    let relative = path.strip_prefix(root).unwrap_or(path);
    let (header, body) = Frontmatter::parse(&raw, path)?;
    let metadata = header.to_metadata();
    let structure = scan_structure(body);

    let title = metadata
        .get_scalar("title")
        .map(str::to_string)
        .or_else(|| structure.title.clone())
        .unwrap_or_else(|| title_from_path(relative));

    let modified_at = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);

    Ok(Document {
        id: document_id(relative),
        title,
        source_path: relative.to_string_lossy().replace('\\', "/"),
        body: body.to_string(),
        metadata,
        word_count: structure.word_count,
        headings: structure.headings,
        code_block_count: structure.code_block_count,
        list_item_count: structure.list_item_count,
        content_hash: content_hash(body),
        modified_at,
    })
}

/// Outcome of loading a directory: parsed documents plus the per-file
/// failures that were excluded from the batch.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub documents: Vec<Document>,
    pub errors: Vec<LoadError>,
}

/// A document that could not be loaded, with the message shown to the user.
#[derive(Debug, Clone)]
pub struct LoadError {
    pub path: PathBuf,
    pub message: String,
}

/// Load every markdown file under `source_dir`. Parse failures exclude the
/// file and are recorded; only a missing source directory is an error.
#[instrument(skip_all, fields(dir = %source_dir.display()))]
pub fn load_documents(source_dir: &Path) -> Result<LoadOutcome> {
    let files = discover(source_dir)?;
    let mut outcome = LoadOutcome::default();

    for path in files {
        match read_document(source_dir, &path) {
            Ok(document) => outcome.documents.push(document),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unparseable document");
                outcome.errors.push(LoadError {
                    path,
                    message: e.to_string(),
                });
            }
        }
    }

    debug!(
        loaded = outcome.documents.len(),
        failed = outcome.errors.len(),
        "document load complete"
    );
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Persist a document's metadata back to its source file.
///
/// The original header is re-parsed so untouched fields keep their exact
/// bytes; metadata changes are applied in order and new keys append at the
/// end of the header. The write is atomic (temp file + rename).
pub fn write_document(root: &Path, document: &Document) -> Result<()> {
    let path = root.join(&document.source_path);

    let mut header = if path.exists() {
        let raw = std::fs::read_to_string(&path).map_err(|e| DocForgeError::io(&path, e))?;
        Frontmatter::parse(&raw, &path)?.0
    } else {
        Frontmatter::new()
    };

    header.apply(&document.metadata);
    let content = format!("{}{}", header.serialize(), document.body);
    write_atomic(&path, &content)
}

/// Serialize `metadata` + `body` the way [`write_document`] would, without
/// touching disk. Used to render brand-new documents.
pub fn render_document(metadata: &Metadata, body: &str) -> String {
    let mut header = Frontmatter::new();
    header.apply(metadata);
    format!("{}{}", header.serialize(), body)
}

/// Write via a temp file in the same directory, then rename over the target.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DocForgeError::io(parent, e))?;
    }
    std::fs::write(&tmp, content).map_err(|e| DocForgeError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| DocForgeError::io(path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Stable document id from a relative path: kebab-case slug, extension
/// stripped, segments joined with dashes.
pub fn document_id(relative: &Path) -> String {
    let cleaned = relative
        .to_string_lossy()
        .replace('\\', "/")
        .trim_end_matches(".md")
        .trim_matches('/')
        .to_string();

    if cleaned.is_empty() {
        return "index".to_string();
    }

    cleaned
        .split('/')
        .map(|segment| {
            segment
                .to_lowercase()
                .replace(' ', "-")
                .replace('_', "-")
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '-')
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Human-readable title from a path when neither frontmatter nor an H1
/// provides one.
pub fn title_from_path(relative: &Path) -> String {
    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string());

    if stem == "index" {
        return "Overview".to_string();
    }

    stem.replace('-', " ")
        .replace('_', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => {
                    let upper: String = c.to_uppercase().collect();
                    format!("{upper}{}", chars.collect::<String>())
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
