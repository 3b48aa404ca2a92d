//! SEO agent: proposes description, keywords, tags, and an seo_score.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use docforge_shared::{
    Document, EnhancementResult, KEY_DESCRIPTION, KEY_KEYWORDS, KEY_TAGS, Metadata, Result,
};

use crate::collaborator::{
    Collaborator, RetryPolicy, TaskKind, complete_with_retry, decode_response,
};
use crate::fallback::{derive_description, extract_keywords, truncate_at_word};
use crate::{Agent, body_excerpt};

pub const KEY_SEO_SCORE: &str = "seo_score";

const MAX_DESCRIPTION_CHARS: usize = 160;
const MAX_KEYWORDS: usize = 8;
const MAX_TAGS: usize = 5;
const FALLBACK_KEYWORDS: usize = 5;

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct SeoSuggestion {
    description: String,
    keywords: Vec<String>,
    tags: Vec<String>,
    seo_score: f64,
}

pub struct SeoAgent {
    collaborator: Arc<dyn Collaborator>,
    policy: RetryPolicy,
}

impl SeoAgent {
    pub fn new(collaborator: Arc<dyn Collaborator>, policy: RetryPolicy) -> Self {
        Self {
            collaborator,
            policy,
        }
    }

    async fn suggest(&self, document: &Document) -> Result<SeoSuggestion> {
        let prompt = format!(
            "Title: {}\nPath: {}\nWords: {}\n\n{}",
            document.title,
            document.source_path,
            document.word_count,
            body_excerpt(&document.body, 1500),
        );
        let raw = complete_with_retry(
            self.collaborator.as_ref(),
            self.policy,
            TaskKind::SeoMetadata,
            &prompt,
        )
        .await?;
        decode_response(&raw)
    }

    /// Sanitize an accepted suggestion; holes in it are patched from the
    /// deterministic heuristics so the proposal is always complete.
    fn accept(&self, document: &Document, suggestion: SeoSuggestion) -> EnhancementResult {
        let trimmed = suggestion.description.trim();
        let description = if trimmed.is_empty() {
            derive_description(document, MAX_DESCRIPTION_CHARS)
        } else {
            truncate_at_word(trimmed, MAX_DESCRIPTION_CHARS)
        };

        let mut keywords = sanitize_terms(suggestion.keywords, MAX_KEYWORDS);
        if keywords.is_empty() {
            keywords = extract_keywords(document, FALLBACK_KEYWORDS);
        }
        let mut tags = sanitize_terms(suggestion.tags, MAX_TAGS);
        if tags.is_empty() {
            tags = keywords.iter().take(3).cloned().collect();
        }

        build_result(
            description,
            keywords,
            tags,
            suggestion.seo_score.clamp(0.0, 100.0),
            false,
        )
    }

    fn fallback(&self, document: &Document) -> EnhancementResult {
        let description = derive_description(document, MAX_DESCRIPTION_CHARS);
        let keywords = extract_keywords(document, FALLBACK_KEYWORDS);
        let tags: Vec<String> = keywords.iter().take(3).cloned().collect();
        let score = fallback_score(document, &keywords);
        build_result(description, keywords, tags, score, true)
    }
}

#[async_trait]
impl Agent for SeoAgent {
    fn name(&self) -> &'static str {
        "seo"
    }

    async fn analyze(
        &self,
        document: &Document,
        _accumulated: &Metadata,
    ) -> Result<EnhancementResult> {
        match self.suggest(document).await {
            Ok(suggestion) => Ok(self.accept(document, suggestion)),
            Err(e) => {
                warn!(
                    agent = self.name(),
                    document = %document.id,
                    error = %e,
                    "collaborator unavailable, using deterministic fallback"
                );
                Ok(self.fallback(document))
            }
        }
    }
}

fn build_result(
    description: String,
    keywords: Vec<String>,
    tags: Vec<String>,
    score: f64,
    used_fallback: bool,
) -> EnhancementResult {
    let mut metadata = Metadata::new();
    let improvements = vec![
        format!("description ({} chars)", description.chars().count()),
        format!("keywords ({})", keywords.len()),
        format!("tags ({})", tags.len()),
    ];
    metadata.insert(KEY_DESCRIPTION, description);
    metadata.insert(KEY_KEYWORDS, keywords);
    metadata.insert(KEY_TAGS, tags);
    metadata.insert(KEY_SEO_SCORE, format!("{score:.1}"));

    EnhancementResult {
        proposed_metadata: metadata,
        improvements,
        quality_score: score,
        used_fallback,
        side_artifact: None,
    }
}

/// Lowercase, trim, drop empties, keep first occurrence of duplicates.
fn sanitize_terms(terms: Vec<String>, max: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for term in terms {
        let cleaned = term.trim().to_lowercase();
        if cleaned.is_empty() || out.contains(&cleaned) {
            continue;
        }
        out.push(cleaned);
        if out.len() == max {
            break;
        }
    }
    out
}

fn fallback_score(document: &Document, keywords: &[String]) -> f64 {
    let mut score = 40.0;
    if document.word_count >= 300 {
        score += 15.0;
    }
    if document.headings.len() >= 2 {
        score += 15.0;
    }
    if keywords.len() >= 3 {
        score += 10.0;
    }
    if document.code_block_count > 0 {
        score += 10.0;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use docforge_shared::{DocForgeError, FieldValue, Heading, content_hash};

    struct FakeCollaborator {
        response: Option<String>,
    }

    #[async_trait]
    impl Collaborator for FakeCollaborator {
        async fn complete(&self, _task: TaskKind, _prompt: &str) -> Result<String> {
            match &self.response {
                Some(text) => Ok(text.clone()),
                None => Err(DocForgeError::collaborator("down".to_string())),
            }
        }
    }

    fn doc(body: &str) -> Document {
        Document {
            id: "auth-guide".into(),
            title: "Auth Guide".into(),
            source_path: "auth/guide.md".into(),
            body: body.into(),
            metadata: Metadata::new(),
            word_count: body.split_whitespace().count(),
            headings: vec![
                Heading {
                    level: 1,
                    text: "Auth Guide".into(),
                    word_count: 40,
                },
                Heading {
                    level: 2,
                    text: "Tokens".into(),
                    word_count: 30,
                },
            ],
            code_block_count: 1,
            list_item_count: 0,
            content_hash: content_hash(body),
            modified_at: None,
        }
    }

    fn agent(response: Option<&str>) -> SeoAgent {
        SeoAgent::new(
            Arc::new(FakeCollaborator {
                response: response.map(str::to_string),
            }),
            RetryPolicy {
                max_retries: 0,
                backoff_base_ms: 1,
            },
        )
    }

    #[tokio::test]
    async fn accepts_and_sanitizes_collaborator_suggestion() {
        let response = r#"{
            "description": "  A guide to session tokens.  ",
            "keywords": ["Tokens", "tokens", "", "Sessions"],
            "tags": ["Auth"],
            "seo_score": 130.0
        }"#;
        let result = agent(Some(response))
            .analyze(&doc("Session tokens explained."), &Metadata::new())
            .await
            .expect("analyze");

        assert!(!result.used_fallback);
        assert_eq!(
            result.proposed_metadata.get_scalar(KEY_DESCRIPTION),
            Some("A guide to session tokens.")
        );
        assert_eq!(
            result.proposed_metadata.get_list(KEY_KEYWORDS),
            vec!["tokens", "sessions"]
        );
        assert_eq!(result.proposed_metadata.get_list(KEY_TAGS), vec!["auth"]);
        assert_eq!(result.quality_score, 100.0);
        assert_eq!(
            result.proposed_metadata.get_scalar(KEY_SEO_SCORE),
            Some("100.0")
        );
    }

    #[tokio::test]
    async fn malformed_suggestion_falls_back() {
        let result = agent(Some("not json at all"))
            .analyze(
                &doc("Rotate signing keys before tokens expire. Tokens carry claims."),
                &Metadata::new(),
            )
            .await
            .expect("analyze");

        assert!(result.used_fallback);
        assert!(result.proposed_metadata.get_scalar(KEY_DESCRIPTION).is_some());
        assert!(!result.proposed_metadata.get_list(KEY_KEYWORDS).is_empty());
    }

    #[tokio::test]
    async fn collaborator_failure_falls_back() {
        let body = "Rotate signing keys before tokens expire. Tokens carry claims and tokens rotate.";
        let result = agent(None)
            .analyze(&doc(body), &Metadata::new())
            .await
            .expect("analyze");

        assert!(result.used_fallback);
        let keywords = result.proposed_metadata.get_list(KEY_KEYWORDS);
        assert!(keywords.contains(&"tokens".to_string()));
        let tags = result.proposed_metadata.get_list(KEY_TAGS);
        assert_eq!(tags.len(), 3.min(keywords.len()));
        // word count is small, so only heading/keyword/code bonuses apply
        assert_eq!(result.quality_score, 75.0);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = r#"{"description": "x", "keywords": [], "tags": [], "seo_score": 1.0, "mystery": true}"#;
        assert!(decode_response::<SeoSuggestion>(raw).is_err());
    }
}
