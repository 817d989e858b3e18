//! Custom error types for ragindex

use thiserror::Error;

/// Main error type for ragindex operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Knowledge base not found: {0}")]
    KnowledgeBaseNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Model configuration not found: {0}")]
    ModelNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector engine error: {0}")]
    VectorEngine(String),

    #[error("Ingestion admission interrupted: {0}")]
    ConcurrencyInterrupted(String),

    #[error("Graph indexing service error: {0}")]
    GraphService(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Not initialized: run 'ragindex init' first")]
    NotInitialized,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for ragindex
pub type Result<T> = std::result::Result<T, Error>;

/// Convert qdrant errors
impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Error::VectorEngine(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Other(format!("background task failed: {}", err))
    }
}
