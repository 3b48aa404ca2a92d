//! Error types for DocForge.
//!
//! Library crates use [`DocForgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all DocForge operations.
#[derive(Debug, thiserror::Error)]
pub enum DocForgeError {
    /// Configuration loading or validation error. Fatal at startup.
    #[error("config error: {message}")]
    Config { message: String },

    /// Source directory missing or unreadable during document discovery.
    #[error("discovery error: {message}")]
    Discovery { message: String },

    /// Frontmatter or document structure could not be parsed.
    #[error("parse error in {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    /// External AI/research collaborator failure (network, rate limit,
    /// malformed response). Consumed by agent retry/fallback, never
    /// propagated past an agent.
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// Built index is missing required fields; blocks publishing.
    #[error("index validation error: {message}")]
    IndexValidation { message: String },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocForgeError>;

impl DocForgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a discovery error from any displayable message.
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery {
            message: msg.into(),
        }
    }

    /// Create a parse error tied to the offending file.
    pub fn parse(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a collaborator error from any displayable message.
    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    /// Create an index validation error from any displayable message.
    pub fn index_validation(msg: impl Into<String>) -> Self {
        Self::IndexValidation {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DocForgeError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = DocForgeError::parse("docs/guide.md", "unterminated frontmatter block");
        assert!(err.to_string().contains("guide.md"));
        assert!(err.to_string().contains("unterminated"));

        let err = DocForgeError::index_validation("documents list is empty");
        assert!(err.to_string().contains("documents list is empty"));
    }
}
