//! External AI/research collaborator boundary.
//!
//! Agents talk to the collaborator through the [`Collaborator`] trait so the
//! HTTP client can be swapped for fakes in tests. Responses are free-form
//! model text; [`decode_response`] strips markdown fences and parses into a
//! strict typed schema, so anything malformed lands in the agents' fallback
//! path instead of propagating.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use docforge_shared::{CollaboratorConfig, DocForgeError, Result};

/// User-Agent string for collaborator requests.
const USER_AGENT: &str = concat!("DocForge/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Task kinds
// ---------------------------------------------------------------------------

/// What an agent is asking the collaborator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    SeoMetadata,
    TaxonomyClassification,
    ChunkingAdvice,
    FactCheck,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SeoMetadata => "seo_metadata",
            Self::TaxonomyClassification => "taxonomy_classification",
            Self::ChunkingAdvice => "chunking_advice",
            Self::FactCheck => "fact_check",
        }
    }

    /// System prompt framing the task for the model.
    fn system_prompt(&self) -> &'static str {
        match self {
            Self::SeoMetadata => {
                "You analyze technical documentation and return SEO metadata \
                 as strict JSON with keys: description, keywords, tags, seo_score."
            }
            Self::TaxonomyClassification => {
                "You classify technical documentation and return strict JSON \
                 with keys: topic, difficulty, audience, content_type, taxonomy_score."
            }
            Self::ChunkingAdvice => {
                "You label document sections for retrieval chunking and return \
                 strict JSON with keys: strategy, anchors, bridges."
            }
            Self::FactCheck => {
                "You fact-check technical claims and return strict JSON with \
                 key: findings (list of {term, verdict, note})."
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator trait
// ---------------------------------------------------------------------------

/// Boundary to the external AI/research service.
///
/// `complete` returns the raw model text; decoding and validation are the
/// caller's job. Implementations fail with [`DocForgeError::Collaborator`]
/// for anything recoverable.
#[async_trait]
pub trait Collaborator: Send + Sync {
    async fn complete(&self, task: TaskKind, prompt: &str) -> Result<String>;
}

/// Collaborator used when the config disables external calls: every request
/// fails immediately, sending agents straight to their fallbacks.
pub struct DisabledCollaborator;

#[async_trait]
impl Collaborator for DisabledCollaborator {
    async fn complete(&self, task: TaskKind, _prompt: &str) -> Result<String> {
        Err(DocForgeError::collaborator(format!(
            "collaborator disabled by configuration (task: {})",
            task.as_str()
        )))
    }
}

/// Collaborator selected by configuration: HTTP when enabled, otherwise the
/// disabled stub that routes every agent to its fallback.
pub fn build_collaborator(config: &CollaboratorConfig) -> Result<Arc<dyn Collaborator>> {
    if !config.enabled {
        return Ok(Arc::new(DisabledCollaborator));
    }
    Ok(Arc::new(HttpCollaborator::new(config)?))
}

// ---------------------------------------------------------------------------
// HTTP collaborator
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, serde::Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, serde::Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, serde::Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
}

#[derive(Debug, serde::Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Chat-completion client over the configured endpoint.
pub struct HttpCollaborator {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    api_key: String,
}

impl HttpCollaborator {
    /// Build from config. A missing API key or unparseable endpoint is a
    /// configuration error: fatal at startup, not a per-call condition.
    pub fn new(config: &CollaboratorConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                DocForgeError::config(format!(
                    "collaborator API key not found in ${}",
                    config.api_key_env
                ))
            })?;

        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            DocForgeError::config(format!("invalid collaborator endpoint {}: {e}", config.endpoint))
        })?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                DocForgeError::collaborator(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl Collaborator for HttpCollaborator {
    async fn complete(&self, task: TaskKind, prompt: &str) -> Result<String> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: task.system_prompt().to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| DocForgeError::collaborator(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocForgeError::collaborator(format!(
                "collaborator returned {status} for {}",
                task.as_str()
            )));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| DocForgeError::collaborator(format!("unreadable response body: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| DocForgeError::collaborator("response carried no choices".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Retry with exponential backoff
// ---------------------------------------------------------------------------

/// Retry budget for collaborator calls: the initial attempt plus
/// `max_retries` retries, sleeping `backoff_base_ms * 2^(attempt-1)` before
/// retry number `attempt`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CollaboratorConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base_ms: config.backoff_base_ms,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms * 2u64.pow(attempt.saturating_sub(1)))
    }
}

/// Call the collaborator, retrying per the policy. The final error is
/// returned for the caller to convert into a fallback result.
pub async fn complete_with_retry(
    collaborator: &dyn Collaborator,
    policy: RetryPolicy,
    task: TaskKind,
    prompt: &str,
) -> Result<String> {
    let mut attempt = 0;
    loop {
        match collaborator.complete(task, prompt).await {
            Ok(text) => return Ok(text),
            Err(e) if attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay(attempt);
                warn!(
                    task = task.as_str(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "collaborator call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                debug!(task = task.as_str(), error = %e, "retry budget exhausted");
                return Err(e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Strict response decoding
// ---------------------------------------------------------------------------

/// Decode model text into `T`, stripping markdown fences first. Schema
/// violations (unknown fields, missing fields, wrong types) surface as
/// collaborator errors so callers route them into fallbacks.
pub fn decode_response<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let payload = extract_json_payload(raw);
    serde_json::from_str(payload)
        .map_err(|e| DocForgeError::collaborator(format!("undecodable payload: {e}")))
}

/// Pull the JSON out of a fenced block or surrounding prose.
fn extract_json_payload(raw: &str) -> &str {
    let trimmed = raw.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }

    // Some models wrap JSON in prose; take the outermost braces.
    if !trimmed.starts_with('{') {
        if let (Some(open), Some(close)) = (trimmed.find('{'), trimmed.rfind('}')) {
            if open < close {
                return &trimmed[open..=close];
            }
        }
    }

    trimmed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Sample {
        value: String,
    }

    fn make_config(endpoint: &str) -> CollaboratorConfig {
        CollaboratorConfig {
            enabled: true,
            api_key_env: "DF_COLLAB_TEST_KEY".into(),
            endpoint: endpoint.into(),
            model: "test-model".into(),
            max_retries: 2,
            backoff_base_ms: 1,
            timeout_secs: 5,
        }
    }

    fn completion_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "cmpl-1",
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    #[test]
    fn task_kind_as_str() {
        assert_eq!(TaskKind::SeoMetadata.as_str(), "seo_metadata");
        assert_eq!(TaskKind::FactCheck.as_str(), "fact_check");
    }

    #[test]
    fn decode_plain_json() {
        let decoded: Sample = decode_response(r#"{"value": "ok"}"#).expect("decode");
        assert_eq!(decoded.value, "ok");
    }

    #[test]
    fn decode_fenced_json() {
        let raw = "```json\n{\"value\": \"fenced\"}\n```";
        let decoded: Sample = decode_response(raw).expect("decode");
        assert_eq!(decoded.value, "fenced");
    }

    #[test]
    fn decode_json_wrapped_in_prose() {
        let raw = "Here is the result you asked for:\n{\"value\": \"buried\"}\nHope that helps!";
        let decoded: Sample = decode_response(raw).expect("decode");
        assert_eq!(decoded.value, "buried");
    }

    #[test]
    fn decode_rejects_unknown_fields() {
        let err = decode_response::<Sample>(r#"{"value": "ok", "extra": 1}"#).unwrap_err();
        assert!(matches!(err, DocForgeError::Collaborator(_)));
    }

    #[test]
    fn decode_rejects_non_json() {
        let err = decode_response::<Sample>("I could not produce JSON, sorry.").unwrap_err();
        assert!(matches!(err, DocForgeError::Collaborator(_)));
    }

    #[test]
    fn retry_policy_backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_base_ms: 1000,
        };
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(2), Duration::from_millis(2000));
        assert_eq!(policy.delay(3), Duration::from_millis(4000));
    }

    #[test]
    fn missing_api_key_is_config_error() {
        let mut config = make_config("https://example.com/v1/chat");
        config.api_key_env = "DF_COLLAB_TEST_MISSING_KEY".into();
        let err = HttpCollaborator::new(&config).unwrap_err();
        assert!(matches!(err, DocForgeError::Config { .. }));
    }

    #[tokio::test]
    async fn http_collaborator_returns_message_content() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/v1/chat/completions"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(completion_body("{\"value\": \"hi\"}")),
            )
            .mount(&server)
            .await;

        // SAFETY: test-local env var, unique name.
        unsafe { std::env::set_var("DF_COLLAB_TEST_KEY", "secret") };
        let config = make_config(&format!("{}/v1/chat/completions", server.uri()));
        let collaborator = HttpCollaborator::new(&config).expect("build");

        let text = collaborator
            .complete(TaskKind::SeoMetadata, "analyze this")
            .await
            .expect("complete");
        assert_eq!(text, "{\"value\": \"hi\"}");
    }

    #[tokio::test]
    async fn http_collaborator_maps_server_errors() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(429))
            .mount(&server)
            .await;

        unsafe { std::env::set_var("DF_COLLAB_TEST_KEY", "secret") };
        let config = make_config(&format!("{}/v1/chat/completions", server.uri()));
        let collaborator = HttpCollaborator::new(&config).expect("build");

        let err = collaborator
            .complete(TaskKind::FactCheck, "check this")
            .await
            .unwrap_err();
        assert!(matches!(err, DocForgeError::Collaborator(_)));
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn retry_recovers_after_transient_failure() {
        let server = wiremock::MockServer::start().await;

        // First call fails, the retry succeeds.
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(completion_body("recovered")),
            )
            .with_priority(2)
            .mount(&server)
            .await;

        unsafe { std::env::set_var("DF_COLLAB_TEST_KEY", "secret") };
        let config = make_config(&format!("{}/v1/chat/completions", server.uri()));
        let collaborator = HttpCollaborator::new(&config).expect("build");
        let policy = RetryPolicy {
            max_retries: 2,
            backoff_base_ms: 1,
        };

        let text = complete_with_retry(&collaborator, policy, TaskKind::SeoMetadata, "p")
            .await
            .expect("recovered");
        assert_eq!(text, "recovered");
    }

    #[tokio::test]
    async fn retry_budget_exhausts_into_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        unsafe { std::env::set_var("DF_COLLAB_TEST_KEY", "secret") };
        let config = make_config(&format!("{}/v1/chat/completions", server.uri()));
        let collaborator = HttpCollaborator::new(&config).expect("build");
        let policy = RetryPolicy {
            max_retries: 1,
            backoff_base_ms: 1,
        };

        let err = complete_with_retry(&collaborator, policy, TaskKind::FactCheck, "p")
            .await
            .unwrap_err();
        assert!(matches!(err, DocForgeError::Collaborator(_)));
    }

    #[tokio::test]
    async fn disabled_collaborator_always_fails() {
        let err = DisabledCollaborator
            .complete(TaskKind::SeoMetadata, "anything")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
