//! Sequential enhancement pipeline.
//!
//! Loads the document set, runs the agent chain over each eligible document,
//! merges every agent's metadata delta into the working document (persisting
//! after each agent), consolidates scores, and stamps the enhancement
//! markers. Each run produces a [`RunReport`].

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};

use docforge_agents::{Agent, KEY_CHUNKING_SCORE};
use docforge_shared::{
    AgentStats, DocForgeError, Document, FieldValue, KEY_ENHANCED_AT, KEY_ENHANCED_BY,
    KEY_ENHANCEMENT_MODE, KEY_QUALITY_SCORE, KEY_RAG_SCORE, Metadata, Result, RunId, SideArtifact,
};

use crate::report::{AgentTiming, BatchError, DocumentEvolution, RunReport, StatsAccumulator};
use crate::runlog::{LogLevel, RunLogger};

/// Consolidated score recorded when no agent reported a positive score.
const DEFAULT_QUALITY_SCORE: f64 = 75.0;

/// Subdirectory of the output dir receiving agent side artifacts.
const ARTIFACTS_DIR: &str = "artifacts";

/// Configuration for one enhancement run.
#[derive(Debug, Clone)]
pub struct EnhanceConfig {
    /// Directory holding the markdown document set.
    pub source_dir: PathBuf,
    /// Directory receiving the run report, run log, and side artifacts.
    pub output_dir: PathBuf,
    /// Identifier stamped into `enhanced_by` on processed documents.
    pub enhancer_id: String,
    /// Documents stamped by this pipeline within the window are skipped.
    pub freshness_hours: u64,
    /// Re-enhance everything, ignoring the freshness window.
    pub force: bool,
}

/// Lifecycle of one document during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentState {
    Pending,
    /// The named agent is currently analyzing the document.
    Running(String),
    Completed,
    /// Completed, but at least one agent errored and contributed nothing.
    CompletedPartial,
    /// Untouched: stamped by this pipeline within the freshness window.
    SkippedFresh,
}

impl DocumentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running(_) => "running",
            Self::Completed => "completed",
            Self::CompletedPartial => "completed_partial",
            Self::SkippedFresh => "skipped_fresh",
        }
    }
}

impl std::fmt::Display for DocumentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running(agent) => write!(f, "running({agent})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a document's agent chain starts.
    fn document_started(&self, title: &str, current: usize, total: usize);
    /// Called after each agent finishes (or fails) on the current document.
    fn agent_finished(&self, agent: &str, document_title: &str);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn document_started(&self, _title: &str, _current: usize, _total: usize) {}
    fn agent_finished(&self, _agent: &str, _document_title: &str) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Freshness
// ---------------------------------------------------------------------------

/// Freshness rule: a document is skipped when the previous run's stamp names
/// this pipeline and is younger than the window. Pure function of
/// `(enhanced_by, enhanced_at, now)`, not of agent identity.
pub fn is_fresh(
    enhanced_by: Option<&str>,
    enhanced_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    enhancer_id: &str,
    freshness_hours: u64,
) -> bool {
    let (Some(by), Some(at)) = (enhanced_by, enhanced_at) else {
        return false;
    };
    by == enhancer_id && now.signed_duration_since(at) < Duration::hours(freshness_hours as i64)
}

// ---------------------------------------------------------------------------
// Metadata merging
// ---------------------------------------------------------------------------

/// Merge one agent's proposed delta into the working metadata.
///
/// Scalars replace scalars; whenever either side is a list the values are
/// unioned case-insensitively, first-seen casing winning. Keys are never
/// removed, so enhancement is monotonic over the header.
pub fn merge_metadata(target: &mut Metadata, delta: &Metadata) {
    for (key, proposed) in delta.iter() {
        let merged = match (target.get(key), proposed) {
            (None, _) | (Some(FieldValue::Scalar(_)), FieldValue::Scalar(_)) => proposed.clone(),
            (Some(existing), _) => {
                let mut items = value_items(existing);
                let mut seen: HashSet<String> =
                    items.iter().map(|item| item.to_lowercase()).collect();
                for item in value_items(proposed) {
                    if seen.insert(item.to_lowercase()) {
                        items.push(item);
                    }
                }
                FieldValue::List(items)
            }
        };
        target.insert(key, merged);
    }
}

fn value_items(value: &FieldValue) -> Vec<String> {
    match value {
        FieldValue::List(items) => items.clone(),
        FieldValue::Scalar(s) if !s.is_empty() => vec![s.clone()],
        FieldValue::Scalar(_) => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Run the enhancement pipeline over the document set.
///
/// 1. Load every markdown file under the source dir (parse failures are
///    excluded and reported)
/// 2. Per eligible document, run the agent chain strictly in sequence,
///    merging and persisting after every agent
/// 3. Consolidate scores and stamp the enhancement markers
/// 4. Write `run-report.json`
#[instrument(skip_all, fields(source = %config.source_dir.display()))]
pub async fn run_pipeline(
    config: &EnhanceConfig,
    agents: &[Box<dyn Agent>],
    logger: &dyn RunLogger,
    progress: &dyn ProgressReporter,
) -> Result<RunReport> {
    if agents.is_empty() {
        return Err(DocForgeError::config(
            "no enhancement agents configured, refusing to run",
        ));
    }

    let run_id = RunId::new();
    let started_at = Utc::now();
    info!(%run_id, agents = agents.len(), "starting enhancement run");
    logger.record(LogLevel::Info, &format!("run {run_id} started"));

    // --- Phase 1: Load ---
    progress.phase("Loading documents");
    let outcome = match docforge_loader::load_documents(&config.source_dir) {
        Ok(outcome) => outcome,
        Err(e @ DocForgeError::Discovery { .. }) => {
            warn!(error = %e, "discovery failed, continuing with empty batch");
            logger.record(LogLevel::Warn, &format!("discovery failed: {e}"));
            docforge_loader::LoadOutcome::default()
        }
        Err(e) => return Err(e),
    };

    let mut errors: Vec<BatchError> = outcome
        .errors
        .iter()
        .map(|failure| {
            let relative = failure
                .path
                .strip_prefix(&config.source_dir)
                .unwrap_or(&failure.path);
            BatchError {
                doc_id: docforge_loader::document_id(relative),
                title: docforge_loader::title_from_path(relative),
                message: failure.message.clone(),
            }
        })
        .collect();
    for error in &errors {
        logger.record(
            LogLevel::Warn,
            &format!("{}: excluded from batch: {}", error.doc_id, error.message),
        );
    }

    let documents_total = outcome.documents.len() + outcome.errors.len();
    let total_loaded = outcome.documents.len();

    // --- Phase 2: Agent chain per document ---
    progress.phase("Enhancing documents");
    let now = Utc::now();

    let mut accumulators: BTreeMap<String, StatsAccumulator> = BTreeMap::new();
    let mut evolutions: Vec<DocumentEvolution> = Vec::with_capacity(total_loaded);
    let mut enhanced = 0usize;
    let mut skipped = 0usize;
    let mut partial = 0usize;

    for (position, mut document) in outcome.documents.into_iter().enumerate() {
        progress.document_started(&document.title, position + 1, total_loaded);

        if !config.force
            && is_fresh(
                document.enhanced_by(),
                document.enhanced_at(),
                now,
                &config.enhancer_id,
                config.freshness_hours,
            )
        {
            debug!(id = %document.id, "fresh, skipping");
            logger.record(LogLevel::Debug, &format!("{}: fresh, skipped", document.id));
            skipped += 1;
            evolutions.push(DocumentEvolution {
                doc_id: document.id.clone(),
                title: document.title.clone(),
                state: DocumentState::SkippedFresh.as_str().to_string(),
                consolidated_score: document
                    .metadata
                    .get_scalar(KEY_QUALITY_SCORE)
                    .and_then(|raw| raw.parse().ok())
                    .unwrap_or(0.0),
                improvements: Vec::new(),
                agents: Vec::new(),
            });
            continue;
        }

        match enhance_document(config, agents, &mut document, logger, progress).await {
            Ok(evolution) => {
                if evolution.state == DocumentState::CompletedPartial.as_str() {
                    partial += 1;
                }
                enhanced += 1;
                for timing in &evolution.agents {
                    accumulators
                        .entry(timing.agent.clone())
                        .or_default()
                        .record(timing);
                }
                evolutions.push(evolution);
            }
            Err(e) => {
                warn!(id = %document.id, error = %e, "document failed, continuing batch");
                logger.record(LogLevel::Warn, &format!("{}: failed: {e}", document.id));
                errors.push(BatchError {
                    doc_id: document.id.clone(),
                    title: document.title.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    // --- Phase 3: Report ---
    progress.phase("Writing run report");
    let finished_at = Utc::now();
    let agent_stats: BTreeMap<String, AgentStats> = accumulators
        .iter()
        .map(|(name, acc)| (name.clone(), acc.finish()))
        .collect();

    let report = RunReport {
        run_id,
        enhancer_id: config.enhancer_id.clone(),
        started_at,
        finished_at,
        documents_total,
        documents_enhanced: enhanced,
        documents_skipped: skipped,
        documents_partial: partial,
        agent_stats,
        documents: evolutions,
        errors,
    };

    report.write(&config.output_dir)?;
    logger.record(
        LogLevel::Info,
        &format!(
            "run {run_id} finished: {enhanced} enhanced, {skipped} skipped, {} failed",
            report.errors.len()
        ),
    );

    info!(
        %run_id,
        enhanced,
        skipped,
        partial,
        failed = report.errors.len(),
        "enhancement run complete"
    );
    progress.done(&report);

    Ok(report)
}

/// Run the agent chain over one document, persisting after every agent.
///
/// Single-agent errors are absorbed: the chain continues and the document
/// completes partially. Returns the evolution entry for the report.
async fn enhance_document(
    config: &EnhanceConfig,
    agents: &[Box<dyn Agent>],
    document: &mut Document,
    logger: &dyn RunLogger,
    progress: &dyn ProgressReporter,
) -> Result<DocumentEvolution> {
    let mut state = DocumentState::Pending;
    debug!(id = %document.id, state = %state, "starting agent chain");

    let mut timings: Vec<AgentTiming> = Vec::with_capacity(agents.len());
    let mut improvements: Vec<String> = Vec::new();
    let mut any_error = false;
    let mut all_fallback = true;

    for agent in agents {
        state = DocumentState::Running(agent.name().to_string());
        debug!(id = %document.id, state = %state, "running agent");

        let accumulated = document.metadata.clone();
        let agent_start = Instant::now();

        match agent.analyze(document, &accumulated).await {
            Ok(result) => {
                merge_metadata(&mut document.metadata, &result.proposed_metadata);
                if !result.used_fallback {
                    all_fallback = false;
                }
                improvements.extend(result.improvements.iter().cloned());

                if let Some(artifact) = &result.side_artifact {
                    if let Err(e) = write_side_artifact(&config.output_dir, &document.id, artifact)
                    {
                        warn!(
                            id = %document.id,
                            artifact = %artifact.name,
                            error = %e,
                            "side artifact write failed"
                        );
                    }
                }

                // Later agents read the persisted state, so the delta lands
                // on disk before the next agent starts.
                docforge_loader::write_document(&config.source_dir, document)?;

                timings.push(AgentTiming {
                    agent: agent.name().to_string(),
                    duration_ms: agent_start.elapsed().as_millis() as u64,
                    score: result.quality_score,
                    used_fallback: result.used_fallback,
                    error: None,
                });
            }
            Err(e) => {
                any_error = true;
                warn!(id = %document.id, agent = agent.name(), error = %e, "agent failed, continuing chain");
                logger.record(
                    LogLevel::Warn,
                    &format!("{}: agent {} failed: {e}", document.id, agent.name()),
                );
                timings.push(AgentTiming {
                    agent: agent.name().to_string(),
                    duration_ms: agent_start.elapsed().as_millis() as u64,
                    score: 0.0,
                    used_fallback: false,
                    error: Some(e.to_string()),
                });
            }
        }

        progress.agent_finished(agent.name(), &document.title);
    }

    let consolidated = consolidate_scores(&timings);
    document
        .metadata
        .insert(KEY_QUALITY_SCORE, format!("{consolidated:.1}"));

    // The chunking stage's structure score doubles as the document's
    // retrieval (RAG) score.
    let structure_score = document
        .metadata
        .get_scalar(KEY_CHUNKING_SCORE)
        .and_then(|raw| raw.parse::<f64>().ok());
    if let Some(score) = structure_score {
        document
            .metadata
            .insert(KEY_RAG_SCORE, format!("{score:.1}"));
    }

    document
        .metadata
        .insert(KEY_ENHANCED_BY, config.enhancer_id.as_str());
    document
        .metadata
        .insert(KEY_ENHANCED_AT, Utc::now().to_rfc3339());
    let mode = if all_fallback { "fallback" } else { "ai-assisted" };
    document.metadata.insert(KEY_ENHANCEMENT_MODE, mode);

    docforge_loader::write_document(&config.source_dir, document)?;

    state = if any_error {
        DocumentState::CompletedPartial
    } else {
        DocumentState::Completed
    };
    debug!(id = %document.id, state = %state, score = consolidated, "agent chain finished");
    logger.record(
        LogLevel::Info,
        &format!(
            "{}: {} (score {consolidated:.1})",
            document.id,
            state.as_str()
        ),
    );

    Ok(DocumentEvolution {
        doc_id: document.id.clone(),
        title: document.title.clone(),
        state: state.as_str().to_string(),
        consolidated_score: consolidated,
        improvements,
        agents: timings,
    })
}

/// Mean of the agent scores that are present and positive. Defaults to 75
/// when no agent reported a usable score.
fn consolidate_scores(timings: &[AgentTiming]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for timing in timings {
        if timing.error.is_none() && timing.score > 0.0 {
            sum += timing.score;
            count += 1;
        }
    }

    if count == 0 {
        DEFAULT_QUALITY_SCORE
    } else {
        crate::report::round2(sum / count as f64)
    }
}

/// Write an agent's side artifact under `<output_dir>/artifacts/`.
fn write_side_artifact(
    output_dir: &Path,
    doc_id: &str,
    artifact: &SideArtifact,
) -> Result<PathBuf> {
    let dir = output_dir.join(ARTIFACTS_DIR);
    std::fs::create_dir_all(&dir).map_err(|e| DocForgeError::io(&dir, e))?;

    let path = dir.join(format!("{doc_id}-{}", artifact.name));
    std::fs::write(&path, &artifact.content).map_err(|e| DocForgeError::io(&path, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use docforge_shared::EnhancementResult;

    use crate::report::REPORT_FILE;
    use crate::runlog::BufferedRunLogger;

    const GUIDE: &str = "---\ntitle: \"Account Lockout\"\nkeywords: [authentication]\n---\n\n# Account Lockout\n\nRepeated failures lock the account.\n";

    fn temp_dirs() -> (PathBuf, PathBuf, PathBuf) {
        let base = std::env::temp_dir().join(format!("docforge-core-{}", uuid::Uuid::now_v7()));
        let source = base.join("docs");
        let output = base.join("out");
        std::fs::create_dir_all(&source).expect("create source dir");
        (base, source, output)
    }

    fn write_doc(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn run_config(source: &Path, output: &Path) -> EnhanceConfig {
        EnhanceConfig {
            source_dir: source.to_path_buf(),
            output_dir: output.to_path_buf(),
            enhancer_id: "docforge-pipeline".into(),
            freshness_hours: 24,
            force: false,
        }
    }

    struct StaticAgent {
        name: &'static str,
        score: f64,
        entries: Vec<(&'static str, FieldValue)>,
        used_fallback: bool,
        artifact: Option<SideArtifact>,
        calls: Arc<AtomicUsize>,
    }

    impl StaticAgent {
        fn new(name: &'static str, score: f64) -> Self {
            Self {
                name,
                score,
                entries: Vec::new(),
                used_fallback: false,
                artifact: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn with_entry(mut self, key: &'static str, value: impl Into<FieldValue>) -> Self {
            self.entries.push((key, value.into()));
            self
        }

        fn with_artifact(mut self, name: &str, content: &str) -> Self {
            self.artifact = Some(SideArtifact {
                name: name.to_string(),
                content: content.to_string(),
            });
            self
        }
    }

    #[async_trait]
    impl Agent for StaticAgent {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn analyze(
            &self,
            _document: &Document,
            _accumulated: &Metadata,
        ) -> Result<EnhancementResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut proposed = Metadata::new();
            for (key, value) in &self.entries {
                proposed.insert(*key, value.clone());
            }
            Ok(EnhancementResult {
                proposed_metadata: proposed,
                improvements: vec![format!("{} contributed", self.name)],
                quality_score: self.score,
                used_fallback: self.used_fallback,
                side_artifact: self.artifact.clone(),
            })
        }
    }

    struct FailingAgent;

    #[async_trait]
    impl Agent for FailingAgent {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn analyze(
            &self,
            _document: &Document,
            _accumulated: &Metadata,
        ) -> Result<EnhancementResult> {
            Err(DocForgeError::collaborator("synthetic agent failure"))
        }
    }

    #[tokio::test]
    async fn run_stamps_and_reports() {
        let (base, source, output) = temp_dirs();
        write_doc(&source, "guide.md", GUIDE);

        let agents: Vec<Box<dyn Agent>> = vec![
            Box::new(StaticAgent::new("seo", 80.0).with_entry("description", "lockout behavior")),
            Box::new(StaticAgent::new("chunking", 70.0).with_entry(KEY_CHUNKING_SCORE, "70.0")),
        ];
        let logger = BufferedRunLogger::new();

        let report = run_pipeline(
            &run_config(&source, &output),
            &agents,
            &logger,
            &SilentProgress,
        )
        .await
        .expect("run");

        assert_eq!(report.documents_total, 1);
        assert_eq!(report.documents_enhanced, 1);
        assert_eq!(report.documents_skipped, 0);
        assert!(report.errors.is_empty());
        assert_eq!(report.documents[0].state, "completed");
        assert_eq!(report.documents[0].consolidated_score, 75.0);
        assert_eq!(report.documents[0].improvements.len(), 2);
        assert_eq!(report.agent_stats["seo"].invocations, 1);

        let reloaded = docforge_loader::load_documents(&source).expect("reload");
        let doc = &reloaded.documents[0];
        assert_eq!(doc.enhanced_by(), Some("docforge-pipeline"));
        assert!(doc.enhanced_at().is_some());
        assert_eq!(doc.metadata.get_scalar(KEY_QUALITY_SCORE), Some("75.0"));
        assert_eq!(doc.metadata.get_scalar(KEY_RAG_SCORE), Some("70.0"));
        assert_eq!(
            doc.metadata.get_scalar(KEY_ENHANCEMENT_MODE),
            Some("ai-assisted")
        );
        assert_eq!(
            doc.metadata.get_scalar("description"),
            Some("lockout behavior")
        );

        assert!(output.join(REPORT_FILE).exists());

        std::fs::remove_dir_all(&base).ok();
    }

    #[tokio::test]
    async fn fresh_documents_skip_untouched() {
        let (base, source, output) = temp_dirs();
        write_doc(&source, "guide.md", GUIDE);

        let agent = StaticAgent::new("seo", 80.0).with_entry("description", "pass one");
        let calls = agent.calls.clone();
        let agents: Vec<Box<dyn Agent>> = vec![Box::new(agent)];
        let logger = BufferedRunLogger::new();
        let cfg = run_config(&source, &output);

        run_pipeline(&cfg, &agents, &logger, &SilentProgress)
            .await
            .expect("first run");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let after_first = std::fs::read_to_string(source.join("guide.md")).unwrap();

        let report = run_pipeline(&cfg, &agents, &logger, &SilentProgress)
            .await
            .expect("second run");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.documents_skipped, 1);
        assert_eq!(report.documents[0].state, "skipped_fresh");
        let after_second = std::fs::read_to_string(source.join("guide.md")).unwrap();
        assert_eq!(after_second, after_first);

        // --force ignores the window.
        let mut forced = run_config(&source, &output);
        forced.force = true;
        run_pipeline(&forced, &agents, &logger, &SilentProgress)
            .await
            .expect("forced run");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        std::fs::remove_dir_all(&base).ok();
    }

    #[tokio::test]
    async fn agent_failure_completes_partially() {
        let (base, source, output) = temp_dirs();
        write_doc(&source, "guide.md", GUIDE);

        let agents: Vec<Box<dyn Agent>> = vec![
            Box::new(FailingAgent),
            Box::new(StaticAgent::new("seo", 90.0).with_entry("description", "still ran")),
        ];
        let logger = BufferedRunLogger::new();

        let report = run_pipeline(
            &run_config(&source, &output),
            &agents,
            &logger,
            &SilentProgress,
        )
        .await
        .expect("run");

        assert_eq!(report.documents_enhanced, 1);
        assert_eq!(report.documents_partial, 1);
        let evolution = &report.documents[0];
        assert_eq!(evolution.state, "completed_partial");
        assert!(
            evolution.agents[0]
                .error
                .as_deref()
                .is_some_and(|msg| msg.contains("synthetic agent failure"))
        );
        assert_eq!(evolution.consolidated_score, 90.0);
        assert_eq!(report.agent_stats["broken"].failures, 1);

        // The failing agent contributed nothing; the later agent still landed.
        let reloaded = docforge_loader::load_documents(&source).expect("reload");
        assert_eq!(
            reloaded.documents[0].metadata.get_scalar("description"),
            Some("still ran")
        );

        std::fs::remove_dir_all(&base).ok();
    }

    #[tokio::test]
    async fn zero_agents_is_fatal() {
        let (base, source, output) = temp_dirs();
        write_doc(&source, "guide.md", GUIDE);

        let agents: Vec<Box<dyn Agent>> = Vec::new();
        let err = run_pipeline(
            &run_config(&source, &output),
            &agents,
            &BufferedRunLogger::new(),
            &SilentProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DocForgeError::Config { .. }));

        std::fs::remove_dir_all(&base).ok();
    }

    #[tokio::test]
    async fn missing_source_dir_is_an_empty_batch() {
        let (base, _source, output) = temp_dirs();
        let missing = base.join("nonexistent");

        let agents: Vec<Box<dyn Agent>> = vec![Box::new(StaticAgent::new("seo", 80.0))];
        let logger = BufferedRunLogger::new();
        let report = run_pipeline(
            &run_config(&missing, &output),
            &agents,
            &logger,
            &SilentProgress,
        )
        .await
        .expect("run");

        assert_eq!(report.documents_total, 0);
        assert!(report.documents.is_empty());
        assert!(report.errors.is_empty());
        assert!(
            logger
                .lines()
                .iter()
                .any(|line| line.contains("discovery failed"))
        );

        std::fs::remove_dir_all(&base).ok();
    }

    #[tokio::test]
    async fn unparseable_documents_land_in_error_list() {
        let (base, source, output) = temp_dirs();
        write_doc(&source, "good.md", GUIDE);
        write_doc(&source, "bad.md", "---\ntitle: broken\nno closing delimiter\n");

        let agents: Vec<Box<dyn Agent>> = vec![Box::new(StaticAgent::new("seo", 80.0))];
        let report = run_pipeline(
            &run_config(&source, &output),
            &agents,
            &BufferedRunLogger::new(),
            &SilentProgress,
        )
        .await
        .expect("run");

        assert_eq!(report.documents_total, 2);
        assert_eq!(report.documents_enhanced, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].doc_id, "bad");
        assert!(report.errors[0].message.contains("unterminated"));

        std::fs::remove_dir_all(&base).ok();
    }

    #[tokio::test]
    async fn all_fallback_agents_mark_fallback_mode() {
        let (base, source, output) = temp_dirs();
        write_doc(&source, "guide.md", GUIDE);

        let mut agent = StaticAgent::new("seo", 60.0);
        agent.used_fallback = true;
        let agents: Vec<Box<dyn Agent>> = vec![Box::new(agent)];

        run_pipeline(
            &run_config(&source, &output),
            &agents,
            &BufferedRunLogger::new(),
            &SilentProgress,
        )
        .await
        .expect("run");

        let reloaded = docforge_loader::load_documents(&source).expect("reload");
        assert_eq!(
            reloaded.documents[0]
                .metadata
                .get_scalar(KEY_ENHANCEMENT_MODE),
            Some("fallback")
        );

        std::fs::remove_dir_all(&base).ok();
    }

    #[tokio::test]
    async fn side_artifacts_land_in_output_dir() {
        let (base, source, output) = temp_dirs();
        write_doc(&source, "guide.md", GUIDE);

        let agents: Vec<Box<dyn Agent>> = vec![Box::new(
            StaticAgent::new("validation", 85.0)
                .with_artifact("validation-log.md", "# Validation Log\n"),
        )];

        run_pipeline(
            &run_config(&source, &output),
            &agents,
            &BufferedRunLogger::new(),
            &SilentProgress,
        )
        .await
        .expect("run");

        let path = output.join(ARTIFACTS_DIR).join("guide-validation-log.md");
        let content = std::fs::read_to_string(&path).expect("artifact written");
        assert_eq!(content, "# Validation Log\n");

        std::fs::remove_dir_all(&base).ok();
    }

    #[test]
    fn freshness_is_a_pure_window_check() {
        let now = Utc::now();
        let recent = Some(now - Duration::hours(1));
        let stale = Some(now - Duration::hours(30));
        let me = "docforge-pipeline";

        assert!(is_fresh(Some(me), recent, now, me, 24));
        assert!(!is_fresh(Some(me), stale, now, me, 24));
        assert!(!is_fresh(Some("other-tool"), recent, now, me, 24));
        assert!(!is_fresh(None, recent, now, me, 24));
        assert!(!is_fresh(Some(me), None, now, me, 24));
    }

    #[test]
    fn merge_replaces_scalars_and_unions_lists() {
        let mut target = Metadata::new();
        target.insert("description", "old");
        target.insert("keywords", vec!["Auth".to_string(), "security".to_string()]);

        let mut delta = Metadata::new();
        delta.insert("description", "new");
        delta.insert("keywords", vec!["auth".to_string(), "tokens".to_string()]);
        delta.insert("topic", "security");

        merge_metadata(&mut target, &delta);

        assert_eq!(target.get_scalar("description"), Some("new"));
        // Case-insensitive union, first-seen casing wins.
        assert_eq!(
            target.get_list("keywords"),
            vec![
                "Auth".to_string(),
                "security".to_string(),
                "tokens".to_string()
            ]
        );
        assert_eq!(target.get_scalar("topic"), Some("security"));
    }

    #[test]
    fn merge_promotes_scalar_when_delta_is_list() {
        let mut target = Metadata::new();
        target.insert("tags", "security");

        let mut delta = Metadata::new();
        delta.insert("tags", vec!["api".to_string(), "Security".to_string()]);

        merge_metadata(&mut target, &delta);
        assert_eq!(
            target.get_list("tags"),
            vec!["security".to_string(), "api".to_string()]
        );
    }

    #[test]
    fn merge_never_removes_keys() {
        let mut target = Metadata::new();
        target.insert("title", "Guide");
        target.insert("author", "ops");

        merge_metadata(&mut target, &Metadata::new());
        assert_eq!(target.len(), 2);
    }

    #[test]
    fn consolidation_defaults_when_no_positive_scores() {
        let zero = AgentTiming {
            agent: "validation".into(),
            duration_ms: 3,
            score: 0.0,
            used_fallback: false,
            error: None,
        };
        assert_eq!(consolidate_scores(&[zero]), 75.0);
        assert_eq!(consolidate_scores(&[]), 75.0);
    }

    #[test]
    fn consolidation_ignores_failed_agents() {
        let ok = AgentTiming {
            agent: "seo".into(),
            duration_ms: 3,
            score: 80.0,
            used_fallback: false,
            error: None,
        };
        let failed = AgentTiming {
            agent: "taxonomy".into(),
            duration_ms: 3,
            score: 60.0,
            used_fallback: false,
            error: Some("boom".into()),
        };
        assert_eq!(consolidate_scores(&[ok, failed]), 80.0);
    }
}
