//! Validation/research agent: scans content for risky and validated
//! security practices, fact-checks technical terms through the
//! collaborator, and emits a human-readable validation log as a side
//! artifact. It never touches the document body.
//!
//! The pattern scan is local and deterministic. Collaborator outages only
//! cost the fact-check findings, never the pattern findings.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use docforge_shared::{
    Document, EnhancementResult, KEY_KEYWORDS, Metadata, Result, SideArtifact,
};

use crate::collaborator::{
    Collaborator, RetryPolicy, TaskKind, complete_with_retry, decode_response,
};
use crate::fallback::extract_keywords;
use crate::{Agent, body_excerpt};

pub const KEY_VALIDATION_STATUS: &str = "validation_status";
pub const KEY_VALIDATION_ISSUES: &str = "validation_issues";
pub const KEY_VALIDATION_SCORE: &str = "validation_score";

const FACT_CHECK_TERMS: usize = 3;
const CRITICAL_PENALTY: f64 = 25.0;
const MODERATE_PENALTY: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingKind {
    Critical,
    Moderate,
    Validated,
}

impl FindingKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Moderate => "moderate",
            Self::Validated => "validated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Finding {
    pub kind: FindingKind,
    pub term: String,
    pub note: String,
}

/// Content patterns flagged without any network call. Matched as lowercase
/// substrings of the body.
const RISKY_PATTERNS: &[(&str, FindingKind, &str)] = &[
    (
        "disable server-side validation",
        FindingKind::Critical,
        "server-side validation must stay enabled",
    ),
    (
        "disable ssl verification",
        FindingKind::Critical,
        "TLS verification must stay enabled",
    ),
    (
        "disable certificate validation",
        FindingKind::Critical,
        "certificate validation must stay enabled",
    ),
    (
        "chmod 777",
        FindingKind::Critical,
        "world-writable permissions",
    ),
    (
        "store passwords in plaintext",
        FindingKind::Critical,
        "credentials must be hashed at rest",
    ),
    (
        "disable rate limiting",
        FindingKind::Moderate,
        "removes abuse protection",
    ),
    (
        "without authentication",
        FindingKind::Moderate,
        "unauthenticated access path",
    ),
    (
        "self-signed certificate",
        FindingKind::Moderate,
        "not trusted outside development",
    ),
    (
        "deprecated",
        FindingKind::Moderate,
        "references deprecated functionality",
    ),
];

/// Practices recognized as sound, recorded in the log without a penalty.
const VALIDATED_PATTERNS: &[(&str, &str)] = &[
    ("parameterized queries", "guards against SQL injection"),
    ("input validation", "validates untrusted input"),
    ("least privilege", "least-privilege access model"),
    ("multi-factor authentication", "strong authentication factor"),
    ("content security policy", "mitigates script injection"),
];

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct FactCheckResponse {
    findings: Vec<FactFinding>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct FactFinding {
    term: String,
    verdict: String,
    note: String,
}

pub struct ValidationAgent {
    collaborator: Arc<dyn Collaborator>,
    policy: RetryPolicy,
}

impl ValidationAgent {
    pub fn new(collaborator: Arc<dyn Collaborator>, policy: RetryPolicy) -> Self {
        Self {
            collaborator,
            policy,
        }
    }

    async fn fact_check(&self, document: &Document, terms: &[String]) -> Result<Vec<Finding>> {
        let prompt = format!(
            "Terms: {}\nTitle: {}\n\n{}",
            terms.join(", "),
            document.title,
            body_excerpt(&document.body, 1200),
        );
        let raw = complete_with_retry(
            self.collaborator.as_ref(),
            self.policy,
            TaskKind::FactCheck,
            &prompt,
        )
        .await?;
        let response: FactCheckResponse = decode_response(&raw)?;

        let findings = response
            .findings
            .into_iter()
            .filter_map(|f| {
                let kind = match f.verdict.trim().to_lowercase().as_str() {
                    "critical" => FindingKind::Critical,
                    "moderate" => FindingKind::Moderate,
                    "validated" => FindingKind::Validated,
                    other => {
                        warn!(term = %f.term, verdict = other, "skipping unknown verdict");
                        return None;
                    }
                };
                Some(Finding {
                    kind,
                    term: f.term,
                    note: f.note,
                })
            })
            .collect();
        Ok(findings)
    }
}

#[async_trait]
impl Agent for ValidationAgent {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn analyze(
        &self,
        document: &Document,
        accumulated: &Metadata,
    ) -> Result<EnhancementResult> {
        let mut findings = scan_patterns(&document.body);

        let terms = fact_check_terms(document, accumulated);
        let fact_checked = match self.fact_check(document, &terms).await {
            Ok(remote) => {
                findings.extend(remote);
                true
            }
            Err(e) => {
                warn!(
                    agent = self.name(),
                    document = %document.id,
                    error = %e,
                    "fact check unavailable, reporting pattern findings only"
                );
                false
            }
        };

        Ok(build_result(document, findings, fact_checked))
    }
}

/// Local substring scan over the lowercased body.
fn scan_patterns(body: &str) -> Vec<Finding> {
    let haystack = body.to_lowercase();
    let mut findings = Vec::new();

    for (pattern, kind, note) in RISKY_PATTERNS {
        if haystack.contains(pattern) {
            findings.push(Finding {
                kind: *kind,
                term: (*pattern).to_string(),
                note: (*note).to_string(),
            });
        }
    }
    for (pattern, note) in VALIDATED_PATTERNS {
        if haystack.contains(pattern) {
            findings.push(Finding {
                kind: FindingKind::Validated,
                term: (*pattern).to_string(),
                note: (*note).to_string(),
            });
        }
    }
    findings
}

/// Terms worth fact-checking: earlier agents' keywords when present,
/// otherwise extracted locally.
fn fact_check_terms(document: &Document, accumulated: &Metadata) -> Vec<String> {
    let keywords = accumulated.get_list(KEY_KEYWORDS);
    if keywords.is_empty() {
        extract_keywords(document, FACT_CHECK_TERMS)
    } else {
        keywords.into_iter().take(FACT_CHECK_TERMS).collect()
    }
}

fn build_result(
    document: &Document,
    findings: Vec<Finding>,
    fact_checked: bool,
) -> EnhancementResult {
    let criticals = findings
        .iter()
        .filter(|f| f.kind == FindingKind::Critical)
        .count();
    let moderates = findings
        .iter()
        .filter(|f| f.kind == FindingKind::Moderate)
        .count();
    let validated = findings
        .iter()
        .filter(|f| f.kind == FindingKind::Validated)
        .count();

    let score = (100.0
        - CRITICAL_PENALTY * criticals as f64
        - MODERATE_PENALTY * moderates as f64)
        .max(0.0);
    let status = if criticals > 0 {
        "critical"
    } else if moderates > 0 {
        "review"
    } else {
        "passed"
    };

    let mut metadata = Metadata::new();
    metadata.insert(KEY_VALIDATION_STATUS, status);
    metadata.insert(KEY_VALIDATION_ISSUES, (criticals + moderates).to_string());
    metadata.insert(KEY_VALIDATION_SCORE, format!("{score:.1}"));

    let improvements = vec![format!(
        "validation: {criticals} critical, {moderates} moderate, {validated} validated"
    )];

    EnhancementResult {
        proposed_metadata: metadata,
        improvements,
        quality_score: score,
        used_fallback: !fact_checked,
        side_artifact: Some(SideArtifact {
            name: "validation-log.md".to_string(),
            content: render_log(document, &findings, fact_checked),
        }),
    }
}

fn render_log(document: &Document, findings: &[Finding], fact_checked: bool) -> String {
    let mut out = format!("# Validation log: {}\n\n", document.title);

    for (kind, header) in [
        (FindingKind::Critical, "## Critical issues"),
        (FindingKind::Moderate, "## Moderate issues"),
        (FindingKind::Validated, "## Validated practices"),
    ] {
        let section: Vec<&Finding> = findings.iter().filter(|f| f.kind == kind).collect();
        if section.is_empty() {
            continue;
        }
        out.push_str(header);
        out.push('\n');
        for finding in section {
            out.push_str(&format!("- {} ({})\n", finding.term, finding.note));
        }
        out.push('\n');
    }

    if findings.is_empty() {
        out.push_str("No findings.\n\n");
    }
    if !fact_checked {
        out.push_str("Fact checks skipped: collaborator unavailable.\n");
    }
    out
}
