//! Configuration loading, validation, and management for Surveyor.
//!
//! Loads configuration from `~/.surveyor/config.toml` with environment
//! variable overrides. Validates all settings at startup. The loaded value is
//! passed explicitly to every component; nothing reads configuration from
//! process-wide state after startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.surveyor/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Token budgets and generation policy
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Similarity index settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> u32 {
    2048
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("pipeline", &self.pipeline)
            .field("index", &self.index)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Budgets and policy for one synthesis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Token budget for the summaries packed into the overview prompt
    #[serde(default = "default_token_limit")]
    pub overview_token_limit: usize,

    /// Token budget for the summaries packed into the outline prompt
    #[serde(default = "default_token_limit")]
    pub outline_token_limit: usize,

    /// Token budget for each section's snippet context
    #[serde(default = "default_token_limit")]
    pub section_token_limit: usize,

    /// Records kept from the loader's result
    #[serde(default = "default_max_corpus_size")]
    pub max_corpus_size: usize,

    /// Markdown heading level of top-level sections
    #[serde(default = "default_base_heading_level")]
    pub base_heading_level: usize,

    /// Corrective re-invocations after a schema failure
    #[serde(default = "default_repair_attempts")]
    pub repair_attempts: u32,

    /// Category tags named in the system prompts
    #[serde(default = "default_category_count")]
    pub category_count: usize,

    /// Chunks requested from the similarity index per section
    #[serde(default = "default_similarity_search_k")]
    pub similarity_search_k: usize,

    /// Sections generated concurrently (1 = strictly sequential)
    #[serde(default = "default_section_concurrency")]
    pub section_concurrency: usize,

    /// Log a warning when a section without citations falls back to the whole corpus
    #[serde(default = "default_true")]
    pub warn_on_corpus_fallback: bool,
}

fn default_token_limit() -> usize {
    2_000
}
fn default_max_corpus_size() -> usize {
    10
}
fn default_base_heading_level() -> usize {
    2
}
fn default_repair_attempts() -> u32 {
    1
}
fn default_category_count() -> usize {
    3
}
fn default_similarity_search_k() -> usize {
    100
}
fn default_section_concurrency() -> usize {
    1
}
fn default_true() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            overview_token_limit: default_token_limit(),
            outline_token_limit: default_token_limit(),
            section_token_limit: default_token_limit(),
            max_corpus_size: default_max_corpus_size(),
            base_heading_level: default_base_heading_level(),
            repair_attempts: default_repair_attempts(),
            category_count: default_category_count(),
            similarity_search_k: default_similarity_search_k(),
            section_concurrency: default_section_concurrency(),
            warn_on_corpus_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Model (or encoding name) whose tokenizer counts prompt tokens
    #[serde(default = "default_tokenizer_model")]
    pub tokenizer_model: String,

    /// Maximum tokens per indexed chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Tokens carried over between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Rank chunks by embedding similarity; keyword overlap otherwise
    #[serde(default = "default_true")]
    pub use_embeddings: bool,
}

fn default_tokenizer_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_chunk_size() -> usize {
    150
}
fn default_chunk_overlap() -> usize {
    10
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            tokenizer_model: default_tokenizer_model(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embedding_model: default_embedding_model(),
            use_embeddings: true,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.surveyor/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `SURVEYOR_API_KEY` (highest priority)
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("SURVEYOR_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("SURVEYOR_PROVIDER") {
            self.default_provider = provider;
        }

        if let Ok(model) = std::env::var("SURVEYOR_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".surveyor")
    }

    /// Get the default configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let p = &self.pipeline;
        if p.overview_token_limit == 0 || p.outline_token_limit == 0 || p.section_token_limit == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline token limits must be > 0".into(),
            ));
        }

        if !(1..=6).contains(&p.base_heading_level) {
            return Err(ConfigError::ValidationError(
                "pipeline.base_heading_level must be between 1 and 6".into(),
            ));
        }

        if p.repair_attempts > 5 {
            return Err(ConfigError::ValidationError(
                "pipeline.repair_attempts must be at most 5".into(),
            ));
        }

        if p.max_corpus_size == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_corpus_size must be >= 1".into(),
            ));
        }

        if p.section_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.section_concurrency must be >= 1".into(),
            ));
        }

        if self.index.chunk_size == 0 || self.index.chunk_overlap >= self.index.chunk_size {
            return Err(ConfigError::ValidationError(
                "index.chunk_overlap must be smaller than a non-zero index.chunk_size".into(),
            ));
        }

        Ok(())
    }

    /// Model named in every request: the default provider's own
    /// `default_model` when its table sets one, else the top-level one.
    pub fn effective_model(&self) -> &str {
        self.providers
            .get(&self.default_provider)
            .and_then(|p| p.default_model.as_deref())
            .unwrap_or(&self.default_model)
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            pipeline: PipelineConfig::default(),
            index: IndexConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
