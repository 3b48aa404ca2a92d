//! CLI argument definitions and command handlers.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use docforge_agents::{RetryPolicy, build_collaborator, default_agents};
use docforge_core::{
    BufferedRunLogger, EnhanceConfig, ProgressReporter, RunReport, is_fresh, run_pipeline,
};
use docforge_index::{INDEX_FILE, IndexBuilder, SearchIndexConfig, load_index, publish};
use docforge_search::{SearchContext, SearchEngine};
use docforge_shared::{
    AppConfig, init_config, load_config, load_config_from, validate_api_key,
};

// ---------------------------------------------------------------------------
// Argument definitions
// ---------------------------------------------------------------------------

/// DocForge: enhance a markdown document set with AI metadata and search it.
#[derive(Parser)]
#[command(name = "docforge", version, about)]
pub struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    /// Increase log verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to a config file (defaults to the user config directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a starter config file and print its location.
    Init,

    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run the enhancement pipeline over the document set.
    Enhance {
        /// Source directory holding the markdown documents.
        #[arg(short, long)]
        source: Option<String>,

        /// Re-enhance documents even when they are still fresh.
        #[arg(long)]
        force: bool,
    },

    /// Build and publish the search index artifacts.
    Index {
        /// Source directory holding the markdown documents.
        #[arg(short, long)]
        source: Option<String>,

        /// Output directory for the published artifacts.
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Query the published search index.
    Search {
        /// Query text.
        query: String,

        /// Maximum number of results.
        #[arg(long)]
        max: Option<usize>,

        /// Include semantic-expansion matches.
        #[arg(long, overrides_with = "no_semantic")]
        semantic: bool,

        /// Exclude semantic-expansion matches.
        #[arg(long)]
        no_semantic: bool,

        /// Emit results as JSON instead of a ranked listing.
        #[arg(long)]
        json: bool,
    },

    /// Show document set, last run, and index status.
    Status,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the resolved configuration as TOML.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

pub fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "docforge=info",
        1 => "docforge=debug",
        _ => "docforge=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Pretty => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub async fn run(cli: Cli) -> Result<()> {
    if matches!(cli.command, Command::Init) {
        return cmd_init();
    }

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Init => unreachable!("handled before config load"),
        Command::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(&config),
        },
        Command::Enhance { source, force } => cmd_enhance(&config, source, force).await,
        Command::Index { source, output } => cmd_index(&config, source, output),
        Command::Search {
            query,
            max,
            semantic,
            no_semantic,
            json,
        } => cmd_search(&config, &query, max, semantic, no_semantic, json),
        Command::Status => cmd_status(&config),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_init() -> Result<()> {
    let path = init_config()?;
    println!("Config written to {}", path.display());
    println!("Set DOCFORGE_API_KEY or disable the collaborator before running `docforge enhance`.");
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config)?;
    println!("{rendered}");
    Ok(())
}

async fn cmd_enhance(config: &AppConfig, source: Option<String>, force: bool) -> Result<()> {
    validate_api_key(config)?;

    let enhance_config = EnhanceConfig {
        source_dir: PathBuf::from(source.as_deref().unwrap_or(&config.pipeline.source_dir)),
        output_dir: PathBuf::from(&config.index.output_dir),
        enhancer_id: config.pipeline.enhancer_id.clone(),
        freshness_hours: config.pipeline.freshness_hours,
        force,
    };

    let collaborator = build_collaborator(&config.collaborator)?;
    let policy = RetryPolicy::from_config(&config.collaborator);
    let agents = default_agents(collaborator, policy);

    info!(
        source = %enhance_config.source_dir.display(),
        agents = agents.len(),
        force,
        "starting enhancement run"
    );

    let logger = BufferedRunLogger::new();
    let progress = CliProgress::new();
    let report = run_pipeline(&enhance_config, &agents, &logger, &progress).await?;
    let log_path = logger.flush_to(&enhance_config.output_dir)?;
    debug!(path = %log_path.display(), "run log written");

    println!();
    println!("  Enhancement run {}", report.run_id);
    println!("  Documents: {}", report.documents_total);
    println!("  Enhanced:  {}", report.documents_enhanced);
    println!("  Skipped:   {} (still fresh)", report.documents_skipped);
    if report.documents_partial > 0 {
        println!("  Partial:   {}", report.documents_partial);
    }
    if !report.errors.is_empty() {
        println!("  Failed:    {}", report.errors.len());
        for error in &report.errors {
            println!("    - {}: {}", error.title, error.message);
        }
    }
    println!();
    println!("  Report: {}", enhance_config.output_dir.join(docforge_core::REPORT_FILE).display());
    println!("  Next:   docforge index");
    println!();

    Ok(())
}

fn cmd_index(config: &AppConfig, source: Option<String>, output: Option<String>) -> Result<()> {
    let source_dir = PathBuf::from(source.as_deref().unwrap_or(&config.pipeline.source_dir));
    let output_dir = PathBuf::from(output.as_deref().unwrap_or(&config.index.output_dir));

    let outcome = docforge_loader::load_documents(&source_dir)?;
    for failure in &outcome.errors {
        warn!(path = %failure.path.display(), error = %failure.message, "excluded from index");
    }
    if outcome.documents.is_empty() {
        return Err(eyre!("no documents found under '{}'", source_dir.display()));
    }

    let mut builder = IndexBuilder::new().with_search_config(SearchIndexConfig {
        default_max_results: config.search.max_results,
        semantic_expansion: config.search.show_semantic,
    });
    match RunReport::load(&output_dir)? {
        Some(report) => {
            debug!(run_id = %report.run_id, "carrying agent stats from last run report");
            builder = builder.with_agent_stats(report.agent_stats);
        }
        None => debug!("no run report found, publishing without agent stats"),
    }

    let index = builder.build(&outcome.documents);
    let files = publish(&index, &output_dir)?;

    println!();
    println!("  Search index published");
    println!("  Documents: {} ({} enhanced)", index.analytics.total_documents, index.analytics.enhanced_documents);
    println!("  Keywords:  {}", index.search_indices.keyword_index.len());
    println!("  Index:     {}", files.index.display());
    println!("  Stats:     {}", files.stats.display());
    println!("  Keywords:  {}", files.keywords.display());
    println!();

    Ok(())
}

fn cmd_search(
    config: &AppConfig,
    query: &str,
    max: Option<usize>,
    semantic: bool,
    no_semantic: bool,
    json: bool,
) -> Result<()> {
    let index_path = PathBuf::from(&config.index.output_dir).join(INDEX_FILE);
    if !index_path.exists() {
        return Err(eyre!(
            "no search index at '{}', run `docforge index` first",
            index_path.display()
        ));
    }

    let show_semantic = if no_semantic {
        false
    } else if semantic {
        true
    } else {
        config.search.show_semantic
    };
    let context = SearchContext {
        max_results: max.unwrap_or(config.search.max_results),
        show_semantic,
    };

    let engine = SearchEngine::new(load_index(&index_path)?);
    let results = engine.search(query, &context);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No results for '{query}'.");
        return Ok(());
    }

    println!();
    for (rank, result) in results.iter().enumerate() {
        println!("  {}. {}  [{:.2}]", rank + 1, result.title, result.relevance_score);
        println!("     {}", result.path);
        if !result.matched_keywords.is_empty() {
            println!("     matched:  {}", result.matched_keywords.join(", "));
        }
        if !result.semantic_matches.is_empty() {
            println!("     semantic: {}", result.semantic_matches.join(", "));
        }
        if !result.excerpt.is_empty() {
            println!("     {}", result.excerpt);
        }
        println!();
    }

    Ok(())
}

fn cmd_status(config: &AppConfig) -> Result<()> {
    let source_dir = PathBuf::from(&config.pipeline.source_dir);
    let output_dir = PathBuf::from(&config.index.output_dir);

    println!();
    match docforge_loader::load_documents(&source_dir) {
        Ok(outcome) => {
            let now = Utc::now();
            let enhanced = outcome.documents.iter().filter(|d| d.is_enhanced()).count();
            let fresh = outcome
                .documents
                .iter()
                .filter(|d| {
                    is_fresh(
                        d.enhanced_by(),
                        d.enhanced_at(),
                        now,
                        &config.pipeline.enhancer_id,
                        config.pipeline.freshness_hours,
                    )
                })
                .count();
            println!(
                "  Documents: {} under {}",
                outcome.documents.len(),
                source_dir.display()
            );
            println!("  Enhanced:  {enhanced} ({fresh} fresh)");
            if !outcome.errors.is_empty() {
                println!("  Skipped:   {} unparseable", outcome.errors.len());
            }
        }
        Err(e) => println!("  Documents: unavailable ({e})"),
    }

    match RunReport::load(&output_dir)? {
        Some(report) => println!(
            "  Last run:  {} finished {} ({} enhanced, {} failed)",
            report.run_id,
            report.finished_at.to_rfc3339(),
            report.documents_enhanced,
            report.errors.len()
        ),
        None => println!("  Last run:  none recorded"),
    }

    let index_path = output_dir.join(INDEX_FILE);
    if index_path.exists() {
        match load_index(&index_path) {
            Ok(index) => println!(
                "  Index:     {} documents, generated {}",
                index.analytics.total_documents,
                index.metadata.generated_at.to_rfc3339()
            ),
            Err(e) => println!("  Index:     unreadable ({e})"),
        }
    } else {
        println!("  Index:     not built (run `docforge index`)");
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Spinner-backed progress for interactive runs.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✔"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn document_started(&self, title: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {title}"));
    }

    fn agent_finished(&self, agent: &str, document_title: &str) {
        self.spinner
            .set_message(format!("[{document_title}] {agent} finished"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}
