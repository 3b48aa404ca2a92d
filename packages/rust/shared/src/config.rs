//! Application configuration for DocForge.
//!
//! User config lives at `~/.docforge/docforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DocForgeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docforge";

// ---------------------------------------------------------------------------
// Config structs (matching docforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Enhancement pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// External AI/research collaborator settings.
    #[serde(default)]
    pub collaborator: CollaboratorConfig,

    /// Index build settings.
    #[serde(default)]
    pub index: IndexConfig,

    /// Runtime search defaults.
    #[serde(default)]
    pub search: SearchConfig,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding the markdown document set.
    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    /// Identifier stamped into `enhanced_by` on processed documents.
    #[serde(default = "default_enhancer_id")]
    pub enhancer_id: String,

    /// Documents enhanced within this window are skipped.
    #[serde(default = "default_freshness_hours")]
    pub freshness_hours: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            enhancer_id: default_enhancer_id(),
            freshness_hours: default_freshness_hours(),
        }
    }
}

fn default_source_dir() -> String {
    "docs".into()
}
fn default_enhancer_id() -> String {
    "docforge-pipeline".into()
}
fn default_freshness_hours() -> u64 {
    24
}

/// `[collaborator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    /// Whether agents may call the external collaborator at all.
    /// When false, every agent goes straight to its deterministic fallback.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Completion endpoint URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model identifier sent with each request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Retries per collaborator call before falling back.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff between retries.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: default_api_key_env(),
            endpoint: default_endpoint(),
            model: default_model(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_api_key_env() -> String {
    "DOCFORGE_API_KEY".into()
}
fn default_endpoint() -> String {
    "https://openrouter.ai/api/v1/chat/completions".into()
}
fn default_model() -> String {
    "moonshotai/kimi-k2.5".into()
}
fn default_max_retries() -> u32 {
    2
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[index]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory receiving the persisted index artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "search-data".into()
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default result-list cap.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Whether results carry semantic-expansion matches by default.
    #[serde(default = "default_true")]
    pub show_semantic: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            show_semantic: true,
        }
    }
}

fn default_max_results() -> usize {
    10
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DocForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docforge/docforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocForgeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DocForgeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DocForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DocForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the collaborator API key env var is set and non-empty.
///
/// Only enforced when the collaborator is enabled; a disabled collaborator
/// means every agent runs on deterministic fallbacks and needs no credential.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    if !config.collaborator.enabled {
        return Ok(());
    }

    let var_name = &config.collaborator.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(DocForgeError::config(format!(
            "collaborator API key not found. Set the {var_name} environment variable \
             or disable the collaborator in docforge.toml."
        ))),
    }
}
