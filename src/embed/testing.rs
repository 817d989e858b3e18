//! Deterministic embedding fakes shared by pipeline and retrieval tests

use super::{Embedder, ModelResolver};
use crate::config::ModelKind;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Hashes lowercase words into buckets; texts sharing words land close together
pub struct HashEmbedder {
    pub dimension: usize,
}

impl HashEmbedder {
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for word in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() as usize) % self.dimension] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "hash"
    }
}

/// Resolves a single model id to a [`HashEmbedder`]
pub struct StaticModels {
    pub model_id: String,
    pub embedder: Arc<HashEmbedder>,
}

impl StaticModels {
    pub fn new(model_id: &str, dimension: usize) -> Self {
        Self {
            model_id: model_id.to_string(),
            embedder: Arc::new(HashEmbedder { dimension }),
        }
    }
}

#[async_trait]
impl ModelResolver for StaticModels {
    fn has_model(&self, model_id: &str, kind: ModelKind) -> bool {
        kind == ModelKind::Embedding && model_id == self.model_id
    }

    async fn embedding_model(&self, model_id: &str) -> Result<Arc<dyn Embedder>> {
        if model_id != self.model_id {
            return Err(Error::ModelNotFound(model_id.to_string()));
        }
        Ok(self.embedder.clone())
    }
}
