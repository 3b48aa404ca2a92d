//! Taxonomy agent: classifies documents by topic, difficulty, audience, and
//! content type so the index can build faceted views.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use docforge_shared::{
    Document, EnhancementResult, KEY_AUDIENCE, KEY_CONTENT_TYPE, KEY_DIFFICULTY, KEY_KEYWORDS,
    KEY_TOPIC, Metadata, Result,
};

use crate::collaborator::{
    Collaborator, RetryPolicy, TaskKind, complete_with_retry, decode_response,
};
use crate::{Agent, body_excerpt};

pub const KEY_TAXONOMY_SCORE: &str = "taxonomy_score";

const DIFFICULTIES: &[&str] = &["beginner", "intermediate", "advanced"];
const CONTENT_TYPES: &[&str] = &["tutorial", "guide", "reference", "overview"];

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TaxonomySuggestion {
    topic: String,
    difficulty: String,
    audience: String,
    content_type: String,
    taxonomy_score: f64,
}

pub struct TaxonomyAgent {
    collaborator: Arc<dyn Collaborator>,
    policy: RetryPolicy,
}

impl TaxonomyAgent {
    pub fn new(collaborator: Arc<dyn Collaborator>, policy: RetryPolicy) -> Self {
        Self {
            collaborator,
            policy,
        }
    }

    async fn suggest(
        &self,
        document: &Document,
        accumulated: &Metadata,
    ) -> Result<TaxonomySuggestion> {
        let keywords = accumulated.get_list(KEY_KEYWORDS).join(", ");
        let headings: Vec<&str> = document
            .headings
            .iter()
            .map(|h| h.text.as_str())
            .collect();
        let prompt = format!(
            "Title: {}\nPath: {}\nWords: {}\nHeadings: {}\nKeywords: {}\n\n{}",
            document.title,
            document.source_path,
            document.word_count,
            headings.join(" | "),
            keywords,
            body_excerpt(&document.body, 1200),
        );
        let raw = complete_with_retry(
            self.collaborator.as_ref(),
            self.policy,
            TaskKind::TaxonomyClassification,
            &prompt,
        )
        .await?;
        decode_response(&raw)
    }

    /// Accept a suggestion, constraining enumerated fields to their known
    /// values; anything out of range is replaced by the local heuristic.
    fn accept(
        &self,
        document: &Document,
        accumulated: &Metadata,
        suggestion: TaxonomySuggestion,
    ) -> EnhancementResult {
        let topic = {
            let t = suggestion.topic.trim().to_lowercase();
            if t.is_empty() {
                derive_topic(document, accumulated)
            } else {
                t
            }
        };
        let difficulty = {
            let d = suggestion.difficulty.trim().to_lowercase();
            if DIFFICULTIES.contains(&d.as_str()) {
                d
            } else {
                derive_difficulty(document).to_string()
            }
        };
        let audience = {
            let a = suggestion.audience.trim().to_lowercase();
            if a.is_empty() {
                derive_audience(document).to_string()
            } else {
                a
            }
        };
        let content_type = {
            let c = suggestion.content_type.trim().to_lowercase();
            if CONTENT_TYPES.contains(&c.as_str()) {
                c
            } else {
                derive_content_type(document).to_string()
            }
        };

        build_result(
            topic,
            difficulty,
            audience,
            content_type,
            suggestion.taxonomy_score.clamp(0.0, 100.0),
            false,
        )
    }

    fn fallback(&self, document: &Document, accumulated: &Metadata) -> EnhancementResult {
        let topic = derive_topic(document, accumulated);
        let score = fallback_score(document, &topic);
        build_result(
            topic,
            derive_difficulty(document).to_string(),
            derive_audience(document).to_string(),
            derive_content_type(document).to_string(),
            score,
            true,
        )
    }
}

#[async_trait]
impl Agent for TaxonomyAgent {
    fn name(&self) -> &'static str {
        "taxonomy"
    }

    async fn analyze(
        &self,
        document: &Document,
        accumulated: &Metadata,
    ) -> Result<EnhancementResult> {
        match self.suggest(document, accumulated).await {
            Ok(suggestion) => Ok(self.accept(document, accumulated, suggestion)),
            Err(e) => {
                warn!(
                    agent = self.name(),
                    document = %document.id,
                    error = %e,
                    "collaborator unavailable, using deterministic fallback"
                );
                Ok(self.fallback(document, accumulated))
            }
        }
    }
}

fn build_result(
    topic: String,
    difficulty: String,
    audience: String,
    content_type: String,
    score: f64,
    used_fallback: bool,
) -> EnhancementResult {
    let improvements = vec![format!(
        "classified as {topic} / {difficulty} / {audience} / {content_type}"
    )];

    let mut metadata = Metadata::new();
    metadata.insert(KEY_TOPIC, topic);
    metadata.insert(KEY_DIFFICULTY, difficulty);
    metadata.insert(KEY_AUDIENCE, audience);
    metadata.insert(KEY_CONTENT_TYPE, content_type);
    metadata.insert(KEY_TAXONOMY_SCORE, format!("{score:.1}"));

    EnhancementResult {
        proposed_metadata: metadata,
        improvements,
        quality_score: score,
        used_fallback,
        side_artifact: None,
    }
}

/// Topic hierarchy from the directory path ("security/auth" for
/// security/auth/guide.md), falling back to the first accumulated keyword.
fn derive_topic(document: &Document, accumulated: &Metadata) -> String {
    let segments: Vec<&str> = document.source_path.split('/').collect();
    if segments.len() > 1 {
        return segments[..segments.len() - 1].join("/").to_lowercase();
    }
    accumulated
        .get_list(KEY_KEYWORDS)
        .into_iter()
        .next()
        .unwrap_or_else(|| "general".to_string())
}

fn derive_difficulty(document: &Document) -> &'static str {
    if document.word_count > 1500 || document.code_block_count >= 5 {
        "advanced"
    } else if document.word_count < 400 && document.code_block_count == 0 {
        "beginner"
    } else {
        "intermediate"
    }
}

fn derive_audience(document: &Document) -> &'static str {
    let body = document.body.to_lowercase();
    if document.code_block_count > 0 || body.contains("api") {
        "developers"
    } else if body.contains("deploy") || body.contains("install") || body.contains("configure") {
        "operators"
    } else {
        "general"
    }
}

fn derive_content_type(document: &Document) -> &'static str {
    let title = document.title.to_lowercase();
    if title.contains("reference") || title.contains("api") {
        return "reference";
    }
    let body = document.body.to_lowercase();
    if title.starts_with("how to")
        || body.contains("step 1")
        || (document.list_item_count >= 5 && document.code_block_count >= 1)
    {
        return "tutorial";
    }
    if title.contains("overview") || title.contains("introduction") {
        return "overview";
    }
    "guide"
}

fn fallback_score(document: &Document, topic: &str) -> f64 {
    let mut score = 50.0;
    if topic != "general" {
        score += 15.0;
    }
    if document.headings.len() >= 2 {
        score += 15.0;
    }
    if document.word_count >= 200 {
        score += 10.0;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use docforge_shared::{DocForgeError, Heading, content_hash};

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

    fn doc(path: &str, title: &str, body: &str, code_blocks: usize) -> Document {
        Document {
            id: path.trim_end_matches(".md").replace('/', "-"),
            title: title.into(),
            source_path: path.into(),
            body: body.into(),
            metadata: Metadata::new(),
            word_count: body.split_whitespace().count(),
            headings: vec![
                Heading {
                    level: 1,
                    text: title.into(),
                    word_count: 20,
                },
                Heading {
                    level: 2,
                    text: "Details".into(),
                    word_count: 25,
                },
            ],
            code_block_count: code_blocks,
            list_item_count: 0,
            content_hash: content_hash(body),
            modified_at: None,
        }
    }

    fn agent(response: Option<&str>) -> TaxonomyAgent {
        TaxonomyAgent::new(
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
    async fn accepts_valid_suggestion_lowercased() {
        let response = r#"{
            "topic": "Security/Auth",
            "difficulty": "Advanced",
            "audience": "Developers",
            "content_type": "Guide",
            "taxonomy_score": 88.0
        }"#;
        let result = agent(Some(response))
            .analyze(
                &doc("security/auth/tokens.md", "Tokens", "Body text here.", 0),
                &Metadata::new(),
            )
            .await
            .expect("analyze");

        assert!(!result.used_fallback);
        assert_eq!(
            result.proposed_metadata.get_scalar(KEY_TOPIC),
            Some("security/auth")
        );
        assert_eq!(
            result.proposed_metadata.get_scalar(KEY_DIFFICULTY),
            Some("advanced")
        );
        assert_eq!(
            result.proposed_metadata.get_scalar(KEY_CONTENT_TYPE),
            Some("guide")
        );
    }

    #[tokio::test]
    async fn out_of_range_difficulty_uses_heuristic() {
        let response = r#"{
            "topic": "ops",
            "difficulty": "ninja",
            "audience": "operators",
            "content_type": "guide",
            "taxonomy_score": 70.0
        }"#;
        let short_prose = doc("ops/notes.md", "Notes", "A few words only.", 0);
        let result = agent(Some(response))
            .analyze(&short_prose, &Metadata::new())
            .await
            .expect("analyze");

        assert_eq!(
            result.proposed_metadata.get_scalar(KEY_DIFFICULTY),
            Some("beginner")
        );
    }

    #[tokio::test]
    async fn fallback_topic_comes_from_directory_path() {
        let result = agent(None)
            .analyze(
                &doc("security/auth/guide.md", "Hardening", "Keep secrets out of logs.", 0),
                &Metadata::new(),
            )
            .await
            .expect("analyze");

        assert!(result.used_fallback);
        assert_eq!(
            result.proposed_metadata.get_scalar(KEY_TOPIC),
            Some("security/auth")
        );
    }

    #[tokio::test]
    async fn fallback_topic_uses_accumulated_keywords_for_flat_paths() {
        let mut accumulated = Metadata::new();
        accumulated.insert(KEY_KEYWORDS, vec!["caching".to_string(), "redis".to_string()]);
        let result = agent(None)
            .analyze(
                &doc("caching.md", "Caching", "Cache invalidation is hard.", 0),
                &accumulated,
            )
            .await
            .expect("analyze");

        assert_eq!(
            result.proposed_metadata.get_scalar(KEY_TOPIC),
            Some("caching")
        );
    }

    #[test]
    fn difficulty_thresholds() {
        let long_body = "word ".repeat(1600);
        assert_eq!(
            derive_difficulty(&doc("a.md", "A", &long_body, 0)),
            "advanced"
        );
        assert_eq!(derive_difficulty(&doc("a.md", "A", "short body", 0)), "beginner");
        assert_eq!(
            derive_difficulty(&doc("a.md", "A", "short body", 2)),
            "intermediate"
        );
    }

    #[test]
    fn content_type_heuristics() {
        assert_eq!(
            derive_content_type(&doc("a.md", "API Reference", "calls", 0)),
            "reference"
        );
        assert_eq!(
            derive_content_type(&doc("a.md", "How to Deploy", "do things", 0)),
            "tutorial"
        );
        assert_eq!(
            derive_content_type(&doc("a.md", "Platform Overview", "the platform", 0)),
            "overview"
        );
        assert_eq!(
            derive_content_type(&doc("a.md", "Operating Notes", "notes", 0)),
            "guide"
        );
    }
}
