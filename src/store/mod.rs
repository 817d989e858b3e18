//! Vector engine integration
//!
//! This module defines the capability contract the ingestion pipeline and
//! retrieval paths need from a vector engine, plus two implementations:
//! - Qdrant, where each knowledge-base name is an alias over a physical collection
//! - An in-process engine for local use and tests

mod memory;
mod payload;
mod qdrant;

pub use memory::*;
pub use payload::*;
pub use qdrant::*;

use crate::config::{Config, VectorBackend};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Metadata key linking a segment to its IndexedFile row
pub const INDEXED_FILE_ID_KEY: &str = "indexed_file_id";

/// Metadata key linking a segment to the dataset file it came from
pub const SOURCE_FILE_ID_KEY: &str = "source_file_id";

/// A segment ready to be written to a collection
#[derive(Debug, Clone)]
pub struct SegmentPoint {
    pub id: Uuid,
    pub text: String,
    pub metadata: Map<String, Value>,
    pub vector: Vec<f32>,
}

/// A stored segment as returned by filtered queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRow {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// A segment returned by search, with its fused relevance score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSegment {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// Segment selection by owning IndexedFile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentFilter {
    /// `None` selects every segment; otherwise segments of any listed file
    pub indexed_file_ids: Option<Vec<String>>,
}

impl SegmentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn file(indexed_file_id: &str) -> Self {
        Self {
            indexed_file_ids: Some(vec![indexed_file_id.to_string()]),
        }
    }

    pub fn files(indexed_file_ids: Vec<String>) -> Self {
        Self {
            indexed_file_ids: Some(indexed_file_ids),
        }
    }

    /// Evaluate the filter against segment metadata
    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        match self.indexed_file_ids {
            None => true,
            Some(ref ids) => metadata
                .get(INDEXED_FILE_ID_KEY)
                .and_then(Value::as_str)
                .map(|id| ids.iter().any(|wanted| wanted == id))
                .unwrap_or(false),
        }
    }
}

/// Capabilities required of a vector engine.
///
/// Collections are addressed by knowledge-base name. Implementations must
/// tolerate concurrent upserts into the same collection.
#[async_trait]
pub trait VectorEngine: Send + Sync {
    /// Short backend name for status output
    fn backend(&self) -> &'static str;

    async fn has_collection(&self, name: &str) -> Result<bool>;

    /// Create an empty collection for vectors of `dimension`
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()>;

    /// Rename atomically; fails if `old` is missing or `new` is taken
    async fn rename_collection(&self, old: &str, new: &str) -> Result<()>;

    /// Drop a collection; `Ok(false)` when it did not exist
    async fn drop_collection(&self, name: &str) -> Result<bool>;

    async fn upsert(&self, name: &str, points: Vec<SegmentPoint>) -> Result<()>;

    async fn delete(&self, name: &str, filter: &SegmentFilter) -> Result<()>;

    /// Filtered listing in the engine's native order
    async fn query(
        &self,
        name: &str,
        filter: &SegmentFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SegmentRow>>;

    async fn count(&self, name: &str, filter: &SegmentFilter) -> Result<u64>;

    /// Combined vector + lexical search
    async fn hybrid_search(
        &self,
        name: &str,
        query_text: &str,
        query_vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredSegment>>;
}

/// Build the configured vector engine
pub fn connect(config: &Config) -> Result<Arc<dyn VectorEngine>> {
    match config.vector.backend {
        VectorBackend::Qdrant => Ok(Arc::new(QdrantVectorEngine::new(
            &config.vector.qdrant_url,
            config.qdrant_api_key(),
            config.search.bm25_weight,
        )?)),
        VectorBackend::Memory => Ok(Arc::new(MemoryVectorEngine::new(config.search.bm25_weight))),
    }
}

/// Cosine similarity; zero when either vector has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
