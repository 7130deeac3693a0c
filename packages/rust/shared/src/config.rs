//! Application configuration for bookmark-reorg.
//!
//! User config lives at `~/.bookmark-reorg/bookmark-reorg.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReorgError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "bookmark-reorg.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".bookmark-reorg";

/// Browser-like User-Agent; many sites refuse obvious bots.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

// ---------------------------------------------------------------------------
// Config structs (matching bookmark-reorg.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Metadata enrichment settings.
    #[serde(default)]
    pub enrichment: EnrichmentSection,

    /// LLM categorization settings.
    #[serde(default)]
    pub llm: LlmSection,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path of the persisted record collection.
    #[serde(default = "default_json_output")]
    pub json_output: String,

    /// Path of the reorganized bookmark HTML.
    #[serde(default = "default_html_output")]
    pub html_output: String,

    /// Maximum folder nesting depth for reorganized bookmarks.
    #[serde(default = "default_max_folder_depth")]
    pub max_folder_depth: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            json_output: default_json_output(),
            html_output: default_html_output(),
            max_folder_depth: default_max_folder_depth(),
        }
    }
}

fn default_json_output() -> String {
    "bookmarks.json".into()
}
fn default_html_output() -> String {
    "bookmarks_reorganised.html".into()
}
fn default_max_folder_depth() -> usize {
    4
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSection {
    /// Concurrent page fetches.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Working sets at or below this size are fetched without a pool.
    #[serde(default = "default_sequential_cutoff")]
    pub sequential_cutoff: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum keyword tags kept per page.
    #[serde(default = "default_tag_limit")]
    pub tag_limit: usize,

    /// User-Agent header sent with page fetches.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for EnrichmentSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            sequential_cutoff: default_sequential_cutoff(),
            timeout_secs: default_timeout_secs(),
            tag_limit: default_tag_limit(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_workers() -> usize {
    12
}
fn default_sequential_cutoff() -> usize {
    3
}
fn default_timeout_secs() -> u64 {
    8
}
fn default_tag_limit() -> usize {
    20
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for categorization.
    #[serde(default = "default_model")]
    pub model: String,

    /// Model to switch to when the primary one does not exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,

    /// Bookmarks per LLM request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Sampling temperature (dropped automatically if the model rejects it).
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Attempts per batch before it is skipped.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff between attempts, doubled each retry.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// HTTP timeout for one completion request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            fallback_model: None,
            batch_size: default_batch_size(),
            temperature: default_temperature(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4.1-mini".into()
}
fn default_batch_size() -> usize {
    25
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    2_000
}
fn default_request_timeout_secs() -> u64 {
    120
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime enrichment configuration.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Worker pool size.
    pub workers: usize,
    /// Largest working set fetched sequentially.
    pub sequential_cutoff: usize,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum keyword tags kept per page.
    pub tag_limit: usize,
    /// User-Agent header.
    pub user_agent: String,
}

impl From<&AppConfig> for EnrichConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            workers: config.enrichment.workers.max(1),
            sequential_cutoff: config.enrichment.sequential_cutoff,
            timeout: Duration::from_secs(config.enrichment.timeout_secs),
            tag_limit: config.enrichment.tag_limit,
            user_agent: config.enrichment.user_agent.clone(),
        }
    }
}

/// Runtime categorization configuration.
#[derive(Debug, Clone)]
pub struct CategorizeConfig {
    /// Primary model identifier.
    pub model: String,
    /// Model to switch to if the primary one is unavailable.
    pub fallback_model: Option<String>,
    /// Records per LLM request.
    pub batch_size: usize,
    /// Deepest allowed `location_after`.
    pub max_folder_depth: usize,
    /// Sampling temperature, `None` to use the provider default.
    pub temperature: Option<f32>,
    /// Attempts per batch.
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub backoff: Duration,
}

impl From<&AppConfig> for CategorizeConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: config.llm.model.clone(),
            fallback_model: config.llm.fallback_model.clone(),
            batch_size: config.llm.batch_size.max(1),
            max_folder_depth: config.defaults.max_folder_depth,
            temperature: Some(config.llm.temperature),
            max_attempts: config.llm.max_attempts.max(1),
            backoff: Duration::from_millis(config.llm.backoff_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.bookmark-reorg/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| ReorgError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.bookmark-reorg/bookmark-reorg.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| ReorgError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ReorgError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ReorgError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| ReorgError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ReorgError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the LLM API key env var is set and non-empty, returning the key.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(ReorgError::config(format!(
            "LLM API key not found. Set the {var_name} environment variable."
        ))),
    }
}
