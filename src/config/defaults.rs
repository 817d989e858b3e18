//! Default values for configuration

use super::{ModelConfig, ModelKind};

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default environment variable name for Qdrant API key
pub fn default_qdrant_api_key_env() -> String {
    "QDRANT_API_KEY".to_string()
}

/// Default embedding endpoint (OpenAI-compatible `/embeddings` lives below it)
pub fn default_embedding_base_url() -> String {
    std::env::var("RAGINDEX_EMBEDDING_URL").unwrap_or_else(|_| "http://127.0.0.1:7997/v1".to_string())
}

/// Id under which the default embedding model is registered
pub fn default_embedding_model_id() -> String {
    "default-embedding".to_string()
}

/// Model registry shipped with a fresh config
pub fn default_models() -> Vec<ModelConfig> {
    vec![ModelConfig {
        id: default_embedding_model_id(),
        kind: ModelKind::Embedding,
        model_name: "BAAI/bge-small-en-v1.5".to_string(),
        base_url: default_embedding_base_url(),
        api_key_env: None,
        dimension: Some(384),
    }]
}

/// Default maximum characters per chunk
pub fn default_chunk_size() -> usize {
    500
}

/// Default overlap characters between chunks
pub fn default_overlap_size() -> usize {
    50
}

/// Concurrent file pipelines admitted across all knowledge bases
pub fn default_max_concurrent_files() -> usize {
    10
}

/// Segments embedded and upserted per request
pub fn default_embed_batch_size() -> usize {
    20
}

/// Upper bound on search `top_k`
pub const MAX_TOP_K: usize = 100;

/// Default number of search results
pub fn default_top_k() -> usize {
    5
}

/// Default BM25 weight for the in-memory hybrid search
pub fn default_bm25_weight() -> f32 {
    0.3
}

/// Request timeout for outbound HTTP collaborators
pub fn default_http_timeout_secs() -> u64 {
    30
}
