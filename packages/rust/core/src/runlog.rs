//! Structured run logging.
//!
//! The pipeline records run events through an injected [`RunLogger`] sink,
//! so the same stream reaches the tracing subscriber and the persisted
//! `run-log.txt` without any global console state.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, info, warn};

use docforge_shared::{DocForgeError, Result};

/// File name of the persisted run log.
pub const LOG_FILE: &str = "run-log.txt";

/// Severity of a run log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
        }
    }
}

/// Structured logging sink injected into the pipeline.
pub trait RunLogger: Send + Sync {
    /// Record one run event.
    fn record(&self, level: LogLevel, message: &str);
}

/// Forwards each record to `tracing` and buffers the formatted line in
/// memory; [`BufferedRunLogger::flush_to`] persists the buffer at the end
/// of the run.
#[derive(Debug, Default)]
pub struct BufferedRunLogger {
    lines: Mutex<Vec<String>>,
}

impl BufferedRunLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the buffered lines, in record order.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|lines| lines.clone()).unwrap_or_default()
    }

    /// Write the buffered lines to `run-log.txt` under `output_dir`.
    pub fn flush_to(&self, output_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(output_dir).map_err(|e| DocForgeError::io(output_dir, e))?;
        let path = output_dir.join(LOG_FILE);

        let mut content = self.lines().join("\n");
        if !content.is_empty() {
            content.push('\n');
        }

        std::fs::write(&path, content).map_err(|e| DocForgeError::io(&path, e))?;
        Ok(path)
    }
}

impl RunLogger for BufferedRunLogger {
    fn record(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => debug!(target: "docforge::run", "{message}"),
            LogLevel::Info => info!(target: "docforge::run", "{message}"),
            LogLevel::Warn => warn!(target: "docforge::run", "{message}"),
        }

        let line = format!(
            "{} [{}] {message}",
            Utc::now().to_rfc3339(),
            level.as_str()
        );
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }
}
