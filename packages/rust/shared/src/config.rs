//! Application configuration for archdoc.
//!
//! User config lives at `~/.archdoc/archdoc.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file, only the names of the env vars
//! that hold them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ArchDocError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "archdoc.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".archdoc";

// ---------------------------------------------------------------------------
// Config structs (matching archdoc.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Azure OpenAI settings (generation + embeddings).
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Azure AI Search settings (knowledge retrieval).
    #[serde(default)]
    pub search: SearchConfig,

    /// Section pipeline tuning.
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Url>,

    /// Name of the env var holding the API key.
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// REST API version query parameter.
    #[serde(default = "default_openai_api_version")]
    pub api_version: String,

    /// Deployment used for section writing and review.
    #[serde(default = "default_chat_deployment")]
    pub chat_deployment: String,

    /// Deployment used for query embeddings.
    #[serde(default = "default_embedding_deployment")]
    pub embedding_deployment: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: default_openai_key_env(),
            api_version: default_openai_api_version(),
            chat_deployment: default_chat_deployment(),
            embedding_deployment: default_embedding_deployment(),
        }
    }
}

fn default_openai_key_env() -> String {
    "AZURE_OPENAI_KEY".into()
}
fn default_openai_api_version() -> String {
    "2024-02-15-preview".into()
}
fn default_chat_deployment() -> String {
    "gpt-4".into()
}
fn default_embedding_deployment() -> String {
    "text-embedding-ada-002".into()
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search service endpoint, e.g. `https://my-search.search.windows.net`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Url>,

    /// Name of the env var holding the query key.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Index holding the governance knowledge base.
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// REST API version query parameter.
    #[serde(default = "default_search_api_version")]
    pub api_version: String,

    /// Vector field queried during hybrid search.
    #[serde(default = "default_vector_field")]
    pub vector_field: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: default_search_key_env(),
            index_name: default_index_name(),
            api_version: default_search_api_version(),
            vector_field: default_vector_field(),
        }
    }
}

fn default_search_key_env() -> String {
    "AZURE_SEARCH_KEY".into()
}
fn default_index_name() -> String {
    "tad-knowledge-base".into()
}
fn default_search_api_version() -> String {
    "2023-11-01".into()
}
fn default_vector_field() -> String {
    "text_vector".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Regeneration attempts after the first draft of a section.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Minimum completeness score accepted when no free-text content exists.
    #[serde(default = "default_completeness_threshold")]
    pub completeness_threshold: f64,

    /// Results requested per knowledge query.
    #[serde(default = "default_top_k")]
    pub retrieval_top_k: usize,

    /// Deadline applied to every embedding, search and generation call.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Directory with `writer/<section>.txt` and `reviewer/quality_validator.txt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts_dir: Option<PathBuf>,

    #[serde(default = "default_writer_temperature")]
    pub writer_temperature: f32,

    #[serde(default = "default_writer_max_tokens")]
    pub writer_max_tokens: u32,

    #[serde(default = "default_reviewer_temperature")]
    pub reviewer_temperature: f32,

    #[serde(default = "default_reviewer_max_tokens")]
    pub reviewer_max_tokens: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            completeness_threshold: default_completeness_threshold(),
            retrieval_top_k: default_top_k(),
            call_timeout_secs: default_call_timeout(),
            prompts_dir: None,
            writer_temperature: default_writer_temperature(),
            writer_max_tokens: default_writer_max_tokens(),
            reviewer_temperature: default_reviewer_temperature(),
            reviewer_max_tokens: default_reviewer_max_tokens(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}
fn default_completeness_threshold() -> f64 {
    0.3
}
fn default_top_k() -> usize {
    5
}
fn default_call_timeout() -> u64 {
    120
}
fn default_writer_temperature() -> f32 {
    0.4
}
fn default_writer_max_tokens() -> u32 {
    4000
}
fn default_reviewer_temperature() -> f32 {
    0.2
}
fn default_reviewer_max_tokens() -> u32 {
    2000
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Total attempts per section are `max_retries + 1`.
    pub max_retries: u32,
    pub completeness_threshold: f64,
    pub retrieval_top_k: usize,
    pub call_timeout: Duration,
    pub prompts_dir: Option<PathBuf>,
    pub writer_temperature: f32,
    pub writer_max_tokens: u32,
    pub reviewer_temperature: f32,
    pub reviewer_max_tokens: u32,
}

impl PipelineConfig {
    /// Attempt ceiling for one section's correction loop.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let p = &config.pipeline;
        Self {
            max_retries: p.max_retries,
            completeness_threshold: p.completeness_threshold,
            retrieval_top_k: p.retrieval_top_k,
            call_timeout: Duration::from_secs(p.call_timeout_secs),
            prompts_dir: p.prompts_dir.clone(),
            writer_temperature: p.writer_temperature,
            writer_max_tokens: p.writer_max_tokens,
            reviewer_temperature: p.reviewer_temperature,
            reviewer_max_tokens: p.reviewer_max_tokens,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.archdoc/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ArchDocError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.archdoc/archdoc.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| ArchDocError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ArchDocError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ArchDocError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ArchDocError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ArchDocError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the env var named by the config. Empty values count as unset.
pub fn read_secret(var_name: &str, service: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ArchDocError::config(format!(
            "{service} API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that both collaborator endpoints are configured and their keys are present.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    if config.openai.endpoint.is_none() {
        return Err(ArchDocError::config(
            "openai.endpoint is not set (run `archdoc config init` and edit the file)",
        ));
    }
    if config.search.endpoint.is_none() {
        return Err(ArchDocError::config("search.endpoint is not set"));
    }
    read_secret(&config.openai.api_key_env, "Azure OpenAI")?;
    read_secret(&config.search.api_key_env, "Azure AI Search")?;
    Ok(())
}
