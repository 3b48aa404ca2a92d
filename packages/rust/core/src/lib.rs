//! Pipeline orchestration for DocForge.
//!
//! Ties the loader and the agent chain into the end-to-end enhance run:
//! freshness gating, strictly sequential agent execution with per-agent
//! persistence, metadata merging, score consolidation, and run reporting.

pub mod pipeline;
pub mod report;
pub mod runlog;

pub use pipeline::{
    DocumentState, EnhanceConfig, ProgressReporter, SilentProgress, is_fresh, merge_metadata,
    run_pipeline,
};
pub use report::{
    AgentTiming, BatchError, DocumentEvolution, REPORT_FILE, RunReport, StatsAccumulator,
};
pub use runlog::{BufferedRunLogger, LOG_FILE, LogLevel, RunLogger};
