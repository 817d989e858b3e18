//! Configuration management for ragindex
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::chunk::ProcessOptions;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Vector engine selection and connection
    #[serde(default)]
    pub vector: VectorConfig,

    /// Registered model configurations, referenced by id from knowledge bases
    #[serde(default = "default_models")]
    pub models: Vec<ModelConfig>,

    /// Chunking defaults applied when a file is added without explicit options
    #[serde(default)]
    pub chunk: ProcessOptions,

    /// Ingestion scheduler configuration
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Retrieval configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// External graph-indexing service
    #[serde(default)]
    pub graph: GraphConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Which vector engine backs knowledge-base collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    #[default]
    Qdrant,
    /// In-process engine; contents do not survive a restart
    Memory,
}

impl std::fmt::Display for VectorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorBackend::Qdrant => write!(f, "qdrant"),
            VectorBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Vector engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    #[serde(default)]
    pub backend: VectorBackend,

    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Environment variable name for Qdrant API key
    #[serde(default = "default_qdrant_api_key_env")]
    pub qdrant_api_key_env: String,
}

/// Kind of a registered model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Embedding,
    Chat,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Embedding => write!(f, "embedding"),
            ModelKind::Chat => write!(f, "chat"),
        }
    }
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "embedding" => Ok(ModelKind::Embedding),
            "chat" => Ok(ModelKind::Chat),
            _ => Err(Error::Config(format!("Unknown model kind: {}", s))),
        }
    }
}

/// A registered model endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Id knowledge bases use to reference this model
    pub id: String,

    pub kind: ModelKind,

    /// Model name sent to the provider
    pub model_name: String,

    /// Provider base URL (OpenAI-compatible)
    pub base_url: String,

    /// Environment variable holding the bearer token, if the provider needs one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Output dimension; probed from the provider when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
}

impl ModelConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.is_empty())
    }
}

/// Ingestion scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Maximum file pipelines running at once, across all knowledge bases
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,

    /// Segments per embed+upsert request
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,

    /// Request timeout for embedding calls
    #[serde(default = "default_http_timeout_secs")]
    pub embed_timeout_secs: u64,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of results
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// BM25 weight used by the in-memory engine's hybrid search (0.0 - 1.0)
    #[serde(default = "default_bm25_weight")]
    pub bm25_weight: f32,
}

/// Graph-indexing service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Base URL of the graph-indexing service; GRAPH knowledge bases fail to index without it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,

    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for ragindex data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vector: VectorConfig::default(),
            models: default_models(),
            chunk: ProcessOptions::default(),
            ingestion: IngestionConfig::default(),
            search: SearchConfig::default(),
            graph: GraphConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            qdrant_url: default_qdrant_url(),
            qdrant_api_key_env: default_qdrant_api_key_env(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_files: default_max_concurrent_files(),
            embed_batch_size: default_embed_batch_size(),
            embed_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            service_url: None,
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            bm25_weight: default_bm25_weight(),
        }
    }
}

impl Config {
    /// Get the default base directory for ragindex (~/.ragindex)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ragindex")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("metadata.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("metadata.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the Qdrant API key from environment
    pub fn qdrant_api_key(&self) -> Option<String> {
        std::env::var(&self.vector.qdrant_api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }

    /// Check if ragindex is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Look up a registered model by id
    pub fn model(&self, id: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.chunk
            .validate()
            .map_err(|e| Error::Config(format!("chunk: {}", e)))?;

        if self.ingestion.max_concurrent_files == 0 {
            return Err(Error::Config(
                "ingestion.max_concurrent_files must be positive".to_string(),
            ));
        }

        if self.ingestion.embed_batch_size == 0 {
            return Err(Error::Config(
                "ingestion.embed_batch_size must be positive".to_string(),
            ));
        }

        if self.search.default_top_k == 0 || self.search.default_top_k > MAX_TOP_K {
            return Err(Error::Config(format!(
                "search.default_top_k must be between 1 and {}",
                MAX_TOP_K
            )));
        }

        if self.search.bm25_weight < 0.0 || self.search.bm25_weight > 1.0 {
            return Err(Error::Config(
                "search.bm25_weight must be between 0.0 and 1.0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for model in &self.models {
            if model.id.trim().is_empty() {
                return Err(Error::Config("models: id must not be empty".to_string()));
            }
            if !seen.insert(model.id.as_str()) {
                return Err(Error::Config(format!(
                    "models: duplicate model id '{}'",
                    model.id
                )));
            }
            url::Url::parse(&model.base_url).map_err(|e| {
                Error::Config(format!(
                    "models: invalid base_url for '{}': {}",
                    model.id, e
                ))
            })?;
            if model.dimension == Some(0) {
                return Err(Error::Config(format!(
                    "models: dimension for '{}' must be positive",
                    model.id
                )));
            }
        }

        if let Some(ref service_url) = self.graph.service_url {
            url::Url::parse(service_url)
                .map_err(|e| Error::Config(format!("graph.service_url is invalid: {}", e)))?;
        }

        Ok(())
    }
}
