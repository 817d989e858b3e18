//! Embedding generation
//!
//! This module provides an abstraction over embedding models with:
//! - A trait for embedding clients
//! - A registry resolving knowledge-base model references to clients
//! - An HTTP backend for OpenAI-compatible servers

mod http_backend;
#[cfg(test)]
pub(crate) mod testing;

pub use http_backend::*;

use crate::config::{Config, ModelConfig, ModelKind};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::Embedding("Embedding backend returned no vector".to_string()))
    }

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Resolves a model configuration id to an embedding client
#[async_trait]
pub trait ModelResolver: Send + Sync {
    /// Whether a model of `kind` is registered under `model_id`
    fn has_model(&self, model_id: &str, kind: ModelKind) -> bool;

    async fn embedding_model(&self, model_id: &str) -> Result<Arc<dyn Embedder>>;
}

/// Model registry backed by the `[[models]]` configuration
pub struct ModelRegistry {
    models: HashMap<String, ModelConfig>,
    timeout_secs: u64,
    clients: Mutex<HashMap<String, Arc<dyn Embedder>>>,
}

impl ModelRegistry {
    pub fn new(config: &Config) -> Self {
        Self {
            models: config
                .models
                .iter()
                .map(|m| (m.id.clone(), m.clone()))
                .collect(),
            timeout_secs: config.ingestion.embed_timeout_secs,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a model configuration
    pub fn get(&self, model_id: &str) -> Result<&ModelConfig> {
        self.models
            .get(model_id)
            .ok_or_else(|| Error::ModelNotFound(model_id.to_string()))
    }

    /// Look up a model configuration that must be an embedding model
    pub fn get_embedding(&self, model_id: &str) -> Result<&ModelConfig> {
        let model = self.get(model_id)?;
        if model.kind != ModelKind::Embedding {
            return Err(Error::Validation(format!(
                "Model '{}' is a {} model, not an embedding model",
                model_id, model.kind
            )));
        }
        Ok(model)
    }
}

#[async_trait]
impl ModelResolver for ModelRegistry {
    fn has_model(&self, model_id: &str, kind: ModelKind) -> bool {
        self.models.get(model_id).map(|m| m.kind == kind).unwrap_or(false)
    }

    async fn embedding_model(&self, model_id: &str) -> Result<Arc<dyn Embedder>> {
        let config = self.get_embedding(model_id)?;

        // Held across the probe so a model is only probed once
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(model_id) {
            return Ok(client.clone());
        }

        let embedder = HttpEmbedder::connect(config, self.timeout_secs).await?;
        info!(
            "Resolved embedding model {} ({}, dimension {})",
            model_id,
            embedder.model_name(),
            embedder.dimension()
        );
        let embedder: Arc<dyn Embedder> = Arc::new(embedder);
        clients.insert(model_id.to_string(), embedder.clone());
        Ok(embedder)
    }
}
