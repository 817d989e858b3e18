//! Client for the external graph-indexing service
//!
//! GRAPH knowledge bases bypass the segment pipeline; indexing is started
//! with one `POST {service_url}/api/rag/process/{knowledge_base_id}` call.

use crate::config::GraphConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Starts graph indexing for a knowledge base
#[async_trait]
pub trait GraphIndexer: Send + Sync {
    async fn start_graph_indexing(&self, knowledge_base_id: &str) -> Result<()>;
}

/// HTTP graph-indexing client
pub struct HttpGraphIndexer {
    client: Client,
    base_url: Url,
}

impl HttpGraphIndexer {
    pub fn new(service_url: &str, timeout_secs: u64) -> Result<Self> {
        let base_url = Url::parse(service_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, knowledge_base_id: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Invalid graph service URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "rag", "process", knowledge_base_id]);
        Ok(url)
    }
}

#[async_trait]
impl GraphIndexer for HttpGraphIndexer {
    async fn start_graph_indexing(&self, knowledge_base_id: &str) -> Result<()> {
        let url = self.endpoint(knowledge_base_id)?;
        info!("Starting graph indexing for knowledge base {}", knowledge_base_id);

        self.client
            .post(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::GraphService(e.to_string()))?;
        Ok(())
    }
}

/// Stand-in used when no graph service URL is configured
pub struct UnconfiguredGraphIndexer;

#[async_trait]
impl GraphIndexer for UnconfiguredGraphIndexer {
    async fn start_graph_indexing(&self, knowledge_base_id: &str) -> Result<()> {
        Err(Error::GraphService(format!(
            "graph.service_url is not configured; cannot index knowledge base {}",
            knowledge_base_id
        )))
    }
}

/// Build the graph indexer for the configuration
pub fn graph_indexer(config: &GraphConfig) -> Result<Arc<dyn GraphIndexer>> {
    match config.service_url {
        Some(ref url) => Ok(Arc::new(HttpGraphIndexer::new(url, config.timeout_secs)?)),
        None => Ok(Arc::new(UnconfiguredGraphIndexer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_endpoint_keeps_base_path() {
        let indexer = HttpGraphIndexer::new("http://graph:18000/prefix/", 5).unwrap();
        assert_eq!(
            indexer.endpoint("kb-1").unwrap().as_str(),
            "http://graph:18000/prefix/api/rag/process/kb-1"
        );
    }

    #[tokio::test]
    async fn test_start_posts_to_process_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/rag/process/kb-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = GraphConfig {
            service_url: Some(server.uri()),
            timeout_secs: 5,
        };
        graph_indexer(&config)
            .unwrap()
            .start_graph_indexing("kb-1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_service_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let indexer = HttpGraphIndexer::new(&server.uri(), 5).unwrap();
        let err = indexer.start_graph_indexing("kb-1").await.unwrap_err();
        assert!(matches!(err, Error::GraphService(_)));
    }

    #[tokio::test]
    async fn test_unconfigured_fails() {
        let indexer = graph_indexer(&GraphConfig::default()).unwrap();
        assert!(indexer.start_graph_indexing("kb").await.is_err());
    }
}
