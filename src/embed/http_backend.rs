use super::Embedder;
use crate::config::ModelConfig;
use crate::embedding_backend::EmbeddingBackendClient;
use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::debug;

const PROBE_TEXT: &str = "dimension probe";

pub struct HttpEmbedder {
    client: EmbeddingBackendClient,
    model_id: String,
    model_name: String,
    dimension: usize,
}

impl HttpEmbedder {
    /// Build an embedder, probing the backend once when no dimension is configured
    pub async fn connect(config: &ModelConfig, timeout_secs: u64) -> Result<Self> {
        let client = EmbeddingBackendClient::new(&config.base_url, config.api_key(), timeout_secs)?;

        let dimension = match config.dimension {
            Some(dimension) => dimension,
            None => {
                debug!("Probing embedding dimension for model {}", config.id);
                let probe = client
                    .embed_text(&config.model_name, vec![PROBE_TEXT.to_string()])
                    .await?;
                let dimension = probe.first().map(Vec::len).unwrap_or(0);
                if dimension == 0 {
                    return Err(Error::Embedding(format!(
                        "Model '{}' returned an empty embedding",
                        config.id
                    )));
                }
                dimension
            }
        };

        Ok(Self {
            client,
            model_id: config.id.clone(),
            model_name: config.model_name.clone(),
            dimension,
        })
    }

    fn validate_dimensions(&self, embeddings: &[Vec<f32>]) -> Result<()> {
        if let Some(mismatch) = embeddings.iter().find(|vec| vec.len() != self.dimension) {
            return Err(Error::Embedding(format!(
                "Embedding dimension mismatch for model '{}': expected {}, got {}",
                self.model_id,
                self.dimension,
                mismatch.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.client.embed_text(&self.model_name, texts).await?;
        self.validate_dimensions(&embeddings)?;
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
