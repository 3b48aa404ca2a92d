//! Enhancement agents for the DocForge pipeline.
//!
//! Each agent receives an immutable document snapshot plus the metadata
//! accumulated from earlier agents, and returns an [`EnhancementResult`]
//! delta. Agents may call the external collaborator; when it is disabled,
//! exhausted, or returns unusable output they degrade to deterministic
//! local heuristics and mark the result with `used_fallback`.
//!
//! Agent errors are reserved for unrecoverable configuration problems.
//! Anything transient is absorbed into the fallback path, so `analyze`
//! practically always returns `Ok`.

use std::sync::Arc;

use async_trait::async_trait;

use docforge_shared::{Document, EnhancementResult, Metadata, Result};

pub mod chunking;
pub mod collaborator;
pub mod fallback;
pub mod seo;
pub mod taxonomy;
pub mod validation;

pub use chunking::{ChunkingAgent, KEY_CHUNKING_SCORE};
pub use collaborator::{
    Collaborator, DisabledCollaborator, HttpCollaborator, RetryPolicy, TaskKind,
    build_collaborator, complete_with_retry, decode_response,
};
pub use seo::{KEY_SEO_SCORE, SeoAgent};
pub use taxonomy::{KEY_TAXONOMY_SCORE, TaxonomyAgent};
pub use validation::{
    Finding, FindingKind, KEY_VALIDATION_ISSUES, KEY_VALIDATION_SCORE, KEY_VALIDATION_STATUS,
    ValidationAgent,
};

/// One enhancement agent in the pipeline.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable agent identifier, used in logs, reports, and metadata stamps.
    fn name(&self) -> &'static str;

    /// Analyze a document snapshot and propose a metadata delta.
    /// `accumulated` carries the merged metadata from earlier agents.
    async fn analyze(
        &self,
        document: &Document,
        accumulated: &Metadata,
    ) -> Result<EnhancementResult>;
}

/// The standard agent chain, in execution order. Later agents may read
/// earlier agents' accumulated metadata, so the order is part of the
/// contract.
pub fn default_agents(
    collaborator: Arc<dyn Collaborator>,
    policy: RetryPolicy,
) -> Vec<Box<dyn Agent>> {
    vec![
        Box::new(SeoAgent::new(collaborator.clone(), policy)),
        Box::new(TaxonomyAgent::new(collaborator.clone(), policy)),
        Box::new(ChunkingAgent::new(collaborator.clone(), policy)),
        Box::new(ValidationAgent::new(collaborator, policy)),
    ]
}

/// Prompt-sized body excerpt, cut at a char boundary.
pub(crate) fn body_excerpt(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let mut out: String = body.chars().take(max_chars).collect();
    out.push_str("\n[truncated]");
    out
}
