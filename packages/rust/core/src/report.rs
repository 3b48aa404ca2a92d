//! Run report artifact.
//!
//! Every enhance run writes a `run-report.json` into the output directory:
//! per-agent aggregates, one evolution entry per document, and the batch
//! error list. The index builder folds the agent aggregates from the most
//! recent report into the published index.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use docforge_shared::{AgentStats, DocForgeError, Result, RunId};

/// File name of the persisted run report.
pub const REPORT_FILE: &str = "run-report.json";

/// Timing, score, and failure facts for one agent over one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTiming {
    pub agent: String,
    pub duration_ms: u64,
    pub score: f64,
    pub used_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-document record of what a run did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEvolution {
    pub doc_id: String,
    pub title: String,
    /// Final state: `completed`, `completed_partial`, or `skipped_fresh`.
    pub state: String,
    pub consolidated_score: f64,
    pub improvements: Vec<String>,
    pub agents: Vec<AgentTiming>,
}

/// A document that failed mid-run, reported without stopping the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchError {
    pub doc_id: String,
    pub title: String,
    pub message: String,
}

/// Complete record of one enhance run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: RunId,
    pub enhancer_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub documents_total: usize,
    pub documents_enhanced: usize,
    pub documents_skipped: usize,
    pub documents_partial: usize,
    pub agent_stats: BTreeMap<String, AgentStats>,
    pub documents: Vec<DocumentEvolution>,
    pub errors: Vec<BatchError>,
}

impl RunReport {
    /// Write the report as pretty JSON under `output_dir`, atomically.
    pub fn write(&self, output_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(output_dir).map_err(|e| DocForgeError::io(output_dir, e))?;

        let path = output_dir.join(REPORT_FILE);
        let tmp = output_dir.join(format!(".{REPORT_FILE}.tmp"));
        let json = serde_json::to_string_pretty(self)?;

        std::fs::write(&tmp, json).map_err(|e| DocForgeError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| DocForgeError::io(&path, e))?;
        Ok(path)
    }

    /// Load the report from a previous run, if one was written.
    pub fn load(output_dir: &Path) -> Result<Option<RunReport>> {
        let path = output_dir.join(REPORT_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(&path).map_err(|e| DocForgeError::io(&path, e))?;
        Ok(Some(serde_json::from_str(&raw)?))
    }
}

// ---------------------------------------------------------------------------
// Per-agent aggregation
// ---------------------------------------------------------------------------

/// Accumulates one agent's invocation results across the run, finalized
/// into the report's [`AgentStats`] block.
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    invocations: u64,
    failures: u64,
    fallbacks: u64,
    total_duration_ms: u64,
    score_sum: f64,
    score_count: u64,
}

impl StatsAccumulator {
    pub fn record(&mut self, timing: &AgentTiming) {
        self.invocations += 1;
        if timing.error.is_some() {
            self.failures += 1;
        }
        if timing.used_fallback {
            self.fallbacks += 1;
        }
        self.total_duration_ms += timing.duration_ms;
        if timing.score > 0.0 {
            self.score_sum += timing.score;
            self.score_count += 1;
        }
    }

    pub fn finish(&self) -> AgentStats {
        let mean_score = if self.score_count > 0 {
            round2(self.score_sum / self.score_count as f64)
        } else {
            0.0
        };

        AgentStats {
            invocations: self.invocations,
            failures: self.failures,
            fallbacks: self.fallbacks,
            total_duration_ms: self.total_duration_ms,
            mean_score,
        }
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(agent: &str, score: f64, used_fallback: bool, error: Option<&str>) -> AgentTiming {
        AgentTiming {
            agent: agent.to_string(),
            duration_ms: 12,
            score,
            used_fallback,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn accumulator_counts_failures_and_fallbacks() {
        let mut acc = StatsAccumulator::default();
        acc.record(&timing("seo", 80.0, false, None));
        acc.record(&timing("seo", 70.0, true, None));
        acc.record(&timing("seo", 0.0, false, Some("network down")));

        let stats = acc.finish();
        assert_eq!(stats.invocations, 3);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.fallbacks, 1);
        assert_eq!(stats.total_duration_ms, 36);
        assert_eq!(stats.mean_score, 75.0);
    }

    #[test]
    fn accumulator_mean_ignores_zero_scores() {
        let mut acc = StatsAccumulator::default();
        acc.record(&timing("validation", 0.0, false, None));

        let stats = acc.finish();
        assert_eq!(stats.invocations, 1);
        assert_eq!(stats.mean_score, 0.0);
    }

    #[test]
    fn report_write_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("docforge-report-{}", uuid::Uuid::now_v7()));

        let report = RunReport {
            run_id: RunId::new(),
            enhancer_id: "docforge-pipeline".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            documents_total: 2,
            documents_enhanced: 1,
            documents_skipped: 1,
            documents_partial: 0,
            agent_stats: BTreeMap::new(),
            documents: vec![DocumentEvolution {
                doc_id: "guide".into(),
                title: "Guide".into(),
                state: "completed".into(),
                consolidated_score: 81.25,
                improvements: vec!["Added description".into()],
                agents: vec![timing("seo", 81.25, false, None)],
            }],
            errors: vec![BatchError {
                doc_id: "broken".into(),
                title: "Broken".into(),
                message: "unterminated frontmatter".into(),
            }],
        };

        let path = report.write(&dir).expect("write report");
        assert!(path.ends_with(REPORT_FILE));

        let loaded = RunReport::load(&dir).expect("load").expect("present");
        assert_eq!(loaded.run_id, report.run_id);
        assert_eq!(loaded.documents.len(), 1);
        assert_eq!(loaded.documents[0].state, "completed");
        assert_eq!(loaded.errors[0].doc_id, "broken");

        // Persisted keys are camelCase.
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"runId\""));
        assert!(raw.contains("\"consolidatedScore\""));
        assert!(raw.contains("\"agentStats\""));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_returns_none_when_absent() {
        let dir = std::env::temp_dir().join(format!("docforge-report-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();

        assert!(RunReport::load(&dir).expect("load").is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
