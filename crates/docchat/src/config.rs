//! Configuration handling for docchat.
//!
//! Loaded from `config.toml` in the XDG config directory (or `--config`).
//! Every field has a default, so an empty or missing file is a valid config.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use docchat_core::{ChunkConfig, ConfigError, SearchConfig, SearchType, VectorStoreBackend};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Config file name inside the config directory.
const CONFIG_FILE: &str = "config.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Retrieval configuration
    #[serde(default)]
    pub rag: RagConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkConfig,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Retrieval and index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Vector index backend ("local" or "default")
    #[serde(default = "default_backend")]
    pub vector_store_backend: String,

    /// Embedding model id, or "noop"
    #[serde(default = "default_embedding_model")]
    pub embedding_model_name: String,

    /// Index directory (defaults to the data dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_directory: Option<PathBuf>,

    /// Chunks returned per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Candidates considered by MMR
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,

    /// MMR relevance/diversity balance
    #[serde(default = "default_lambda_mult")]
    pub lambda_mult: f32,

    /// "mmr" or "similarity"
    #[serde(default)]
    pub search_type: SearchType,
}

fn default_backend() -> String {
    "local".to_string()
}

fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_top_k() -> usize {
    6
}

fn default_fetch_k() -> usize {
    20
}

fn default_lambda_mult() -> f32 {
    0.7
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            vector_store_backend: default_backend(),
            embedding_model_name: default_embedding_model(),
            persist_directory: None,
            top_k: default_top_k(),
            fetch_k: default_fetch_k(),
            lambda_mult: default_lambda_mult(),
            search_type: SearchType::default(),
        }
    }
}

/// Language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model id sent to the backend
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// OpenAI-compatible API root
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Env var holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Stream answers as they are generated
    #[serde(default = "default_streaming")]
    pub streaming: bool,

    /// Sampling temperature (backend default if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

fn default_llm_model() -> String {
    docchat_chat::llm::DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    docchat_chat::llm::GROQ_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    docchat_chat::llm::GROQ_API_KEY_ENV.to_string()
}

fn default_streaming() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            streaming: default_streaming(),
            temperature: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default config path when `None`.
    ///
    /// A missing default file yields defaults. An explicitly given path must
    /// exist.
    pub fn load_from(path: Option<PathBuf>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::read(&path)?,
            None => match Self::config_path() {
                Some(path) if path.exists() => Self::read(&path)?,
                _ => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(ConfigError::from)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse TOML text without validating it.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check every bound. Runs before any component is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backend()?;
        self.chunking.validate()?;
        self.search_config().validate()?;
        docchat_embed::validate_model_name(&self.rag.embedding_model_name)?;
        parse_log_level(&self.logging.level)?;
        Ok(())
    }

    /// The configured log level. [`validate`](Self::validate) has already
    /// rejected unknown names.
    pub fn log_level(&self) -> Level {
        parse_log_level(&self.logging.level).unwrap_or(Level::INFO)
    }

    /// The configured index backend.
    pub fn backend(&self) -> Result<VectorStoreBackend, ConfigError> {
        self.rag.vector_store_backend.parse()
    }

    /// Retriever settings.
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            search_type: self.rag.search_type,
            k: self.rag.top_k,
            fetch_k: self.rag.fetch_k,
            lambda_mult: self.rag.lambda_mult,
        }
    }

    /// Index directory, falling back to `<data dir>/index`.
    pub fn persist_directory(&self) -> Option<PathBuf> {
        self.rag
            .persist_directory
            .clone()
            .or_else(|| data_dir().map(|dir| dir.join("index")))
    }

    /// Default config file location.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// A commented config file showing every default.
    pub fn sample_toml() -> String {
        let defaults = Self::default();
        format!(
            r#"# docchat configuration

[rag]
# Only "local" (alias "default") is supported
vector_store_backend = "{backend}"
# Hugging Face model id, or "noop" for offline testing
embedding_model_name = "{embedding}"
# persist_directory = "/path/to/index"
top_k = {top_k}
fetch_k = {fetch_k}
# 1.0 = pure relevance, 0.0 = maximum diversity
lambda_mult = {lambda}
# "mmr" or "similarity"
search_type = "mmr"

[chunking]
# "fixed" or "semantic"
strategy = "fixed"
chunk_size = {chunk_size}
chunk_overlap = {chunk_overlap}
# percentile, standard_deviation, interquartile or gradient
breakpoint_threshold_type = "percentile"
# breakpoint_threshold_amount = 95.0
buffer_size = {buffer_size}

[llm]
model = "{model}"
base_url = "{base_url}"
api_key_env = "{api_key_env}"
streaming = {streaming}
# temperature = 0.2

[logging]
level = "{level}"
"#,
            backend = defaults.rag.vector_store_backend,
            embedding = defaults.rag.embedding_model_name,
            top_k = defaults.rag.top_k,
            fetch_k = defaults.rag.fetch_k,
            lambda = defaults.rag.lambda_mult,
            chunk_size = defaults.chunking.chunk_size,
            chunk_overlap = defaults.chunking.chunk_overlap,
            buffer_size = defaults.chunking.buffer_size,
            model = defaults.llm.model,
            base_url = defaults.llm.base_url,
            api_key_env = defaults.llm.api_key_env,
            streaming = defaults.llm.streaming,
            level = defaults.logging.level,
        )
    }
}

fn parse_log_level(level: &str) -> Result<Level, ConfigError> {
    level.parse().map_err(|_| {
        ConfigError::Invalid(format!(
            "logging.level ({level}) must be one of trace, debug, info, warn, error"
        ))
    })
}

/// Get the XDG data directory for docchat.
pub fn data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOCCHAT_DATA_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "docchat").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the XDG config directory for docchat.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOCCHAT_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "docchat").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the XDG cache directory for docchat (downloaded models).
pub fn cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "docchat").map(|dirs| dirs.cache_dir().to_path_buf())
}
