//! Chunking agent: computes a chunk spec for the document, optionally
//! refined by collaborator advice, and reports it as metadata. When advice
//! is unavailable or unusable the spec degrades to a purely structural one
//! derived from heading and word counts, with no network involvement.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use docforge_chunking::{compute_spec, size_and_overlap, slugify_heading, structural_spec, total_chunks};
use docforge_shared::{
    ChunkSpec, ChunkStrategy, Document, EnhancementResult, KEY_CHUNK_ANCHORS, KEY_CHUNK_BRIDGES,
    KEY_CHUNK_OVERLAP, KEY_CHUNK_SIZE, KEY_CHUNK_STRATEGY, KEY_CHUNK_TOTAL, Metadata, Result,
};

use crate::collaborator::{
    Collaborator, RetryPolicy, TaskKind, complete_with_retry, decode_response,
};
use crate::{Agent, body_excerpt};

pub const KEY_CHUNKING_SCORE: &str = "chunking_score";

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ChunkingAdvice {
    strategy: String,
    anchors: Vec<String>,
    bridges: Vec<String>,
}

pub struct ChunkingAgent {
    collaborator: Arc<dyn Collaborator>,
    policy: RetryPolicy,
}

impl ChunkingAgent {
    pub fn new(collaborator: Arc<dyn Collaborator>, policy: RetryPolicy) -> Self {
        Self {
            collaborator,
            policy,
        }
    }

    async fn advise(&self, document: &Document) -> Result<ChunkingAdvice> {
        let sections: Vec<String> = document
            .headings
            .iter()
            .map(|h| format!("{} ({} words)", h.text, h.word_count))
            .collect();
        let prompt = format!(
            "Title: {}\nWords: {}\nSections:\n{}\n\n{}",
            document.title,
            document.word_count,
            sections.join("\n"),
            body_excerpt(&document.body, 1000),
        );
        let raw = complete_with_retry(
            self.collaborator.as_ref(),
            self.policy,
            TaskKind::ChunkingAdvice,
            &prompt,
        )
        .await?;
        decode_response(&raw)
    }
}

#[async_trait]
impl Agent for ChunkingAgent {
    fn name(&self) -> &'static str {
        "chunking"
    }

    async fn analyze(
        &self,
        document: &Document,
        _accumulated: &Metadata,
    ) -> Result<EnhancementResult> {
        let (spec, used_fallback) = match self.advise(document).await {
            Ok(advice) => match refine_spec(document, advice) {
                Some(spec) => (spec, false),
                None => {
                    warn!(
                        agent = self.name(),
                        document = %document.id,
                        "advice unusable, deriving structural spec"
                    );
                    (structural_spec(document), true)
                }
            },
            Err(e) => {
                warn!(
                    agent = self.name(),
                    document = %document.id,
                    error = %e,
                    "collaborator unavailable, deriving structural spec"
                );
                (structural_spec(document), true)
            }
        };

        Ok(build_result(document, spec, used_fallback))
    }
}

/// Fold collaborator advice into the computed spec. Returns `None` when the
/// advice is unusable (unknown strategy, or no valid anchors), which routes
/// the caller to the structural fallback.
fn refine_spec(document: &Document, advice: ChunkingAdvice) -> Option<ChunkSpec> {
    let strategy: ChunkStrategy = advice.strategy.trim().to_lowercase().parse().ok()?;

    let anchors = sanitize_labels(advice.anchors);
    if anchors.is_empty() {
        return None;
    }

    let mut spec = compute_spec(document);
    let (size, overlap) = size_and_overlap(document.word_count, strategy);
    spec.strategy = strategy;
    spec.size = size;
    spec.overlap = overlap;
    spec.anchors = anchors;
    let bridges = sanitize_labels(advice.bridges);
    if !bridges.is_empty() {
        spec.bridges = bridges;
    }
    spec.total_chunks = total_chunks(document.word_count, size, overlap);
    Some(spec)
}

/// Slugify labels, dropping empties and duplicates while keeping order.
fn sanitize_labels(labels: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        if label.trim().is_empty() {
            continue;
        }
        let slug = slugify_heading(&label);
        if !out.contains(&slug) {
            out.push(slug);
        }
    }
    out
}

fn build_result(document: &Document, spec: ChunkSpec, used_fallback: bool) -> EnhancementResult {
    let score = structure_score(document, &spec);
    let improvements = vec![format!(
        "chunk spec: {} strategy, {} chunks of {} words (overlap {})",
        spec.strategy, spec.total_chunks, spec.size, spec.overlap
    )];

    let mut metadata = Metadata::new();
    metadata.insert(KEY_CHUNK_STRATEGY, spec.strategy.as_str());
    metadata.insert(KEY_CHUNK_SIZE, spec.size.to_string());
    metadata.insert(KEY_CHUNK_OVERLAP, spec.overlap.to_string());
    metadata.insert(KEY_CHUNK_TOTAL, spec.total_chunks.to_string());
    metadata.insert(KEY_CHUNK_ANCHORS, spec.anchors.clone());
    if !spec.bridges.is_empty() {
        metadata.insert(KEY_CHUNK_BRIDGES, spec.bridges.clone());
    }
    metadata.insert(KEY_CHUNKING_SCORE, format!("{score:.1}"));

    EnhancementResult {
        proposed_metadata: metadata,
        improvements,
        quality_score: score,
        used_fallback,
        side_artifact: None,
    }
}

/// Deterministic structure score: how well the document lends itself to
/// clean chunking.
fn structure_score(document: &Document, spec: &ChunkSpec) -> f64 {
    let mut score = 50.0;
    if document.headings.len() >= 2 {
        score += 20.0;
    }
    if !spec.bridges.is_empty() {
        score += 10.0;
    }
    if document.word_count >= 300 {
        score += 10.0;
    }
    if spec.boundaries.len() > 2 {
        score += 10.0;
    }
    score
}
