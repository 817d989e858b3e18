//! In-process vector engine
//!
//! Keeps collections in memory in insertion order. Hybrid search scores every
//! point by cosine similarity and fuses it with BM25 through the ranker.

use super::{cosine_similarity, ScoredSegment, SegmentFilter, SegmentPoint, SegmentRow, VectorEngine};
use crate::error::{Error, Result};
use crate::rank::{Candidate, Ranker};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

struct MemoryCollection {
    dimension: usize,
    points: Vec<SegmentPoint>,
    /// Point id to its index in `points`
    positions: HashMap<Uuid, usize>,
}

impl MemoryCollection {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            points: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn reindex(&mut self) {
        self.positions = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id, i))
            .collect();
    }
}

/// In-memory vector engine
pub struct MemoryVectorEngine {
    collections: RwLock<HashMap<String, MemoryCollection>>,
    bm25_weight: f32,
}

impl MemoryVectorEngine {
    pub fn new(bm25_weight: f32) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            bm25_weight,
        }
    }
}

impl Default for MemoryVectorEngine {
    fn default() -> Self {
        Self::new(crate::config::default_bm25_weight())
    }
}

fn missing(name: &str) -> Error {
    Error::VectorEngine(format!("Collection '{}' does not exist", name))
}

#[async_trait]
impl VectorEngine for MemoryVectorEngine {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(Error::VectorEngine(format!(
                "Collection '{}' already exists",
                name
            )));
        }
        debug!("Creating in-memory collection {} with dimension {}", name, dimension);
        collections.insert(name.to_string(), MemoryCollection::new(dimension));
        Ok(())
    }

    async fn rename_collection(&self, old: &str, new: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(new) {
            return Err(Error::VectorEngine(format!(
                "Collection '{}' already exists",
                new
            )));
        }
        let collection = collections.remove(old).ok_or_else(|| missing(old))?;
        collections.insert(new.to_string(), collection);
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        Ok(self.collections.write().await.remove(name).is_some())
    }

    async fn upsert(&self, name: &str, points: Vec<SegmentPoint>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| missing(name))?;

        if let Some(mismatch) = points.iter().find(|p| p.vector.len() != collection.dimension) {
            return Err(Error::VectorEngine(format!(
                "Vector dimension mismatch for collection '{}': expected {} (got {})",
                name,
                collection.dimension,
                mismatch.vector.len()
            )));
        }

        for point in points {
            match collection.positions.get(&point.id) {
                Some(&i) => collection.points[i] = point,
                None => {
                    collection.positions.insert(point.id, collection.points.len());
                    collection.points.push(point);
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, name: &str, filter: &SegmentFilter) -> Result<()> {
        let mut collections = self.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| missing(name))?;
        collection.points.retain(|p| !filter.matches(&p.metadata));
        collection.reindex();
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        filter: &SegmentFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SegmentRow>> {
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| missing(name))?;
        Ok(collection
            .points
            .iter()
            .filter(|p| filter.matches(&p.metadata))
            .skip(offset)
            .take(limit)
            .map(|p| SegmentRow {
                id: p.id.to_string(),
                text: p.text.clone(),
                metadata: p.metadata.clone(),
            })
            .collect())
    }

    async fn count(&self, name: &str, filter: &SegmentFilter) -> Result<u64> {
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| missing(name))?;
        Ok(collection
            .points
            .iter()
            .filter(|p| filter.matches(&p.metadata))
            .count() as u64)
    }

    async fn hybrid_search(
        &self,
        name: &str,
        query_text: &str,
        query_vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredSegment>> {
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| missing(name))?;

        if query_vector.len() != collection.dimension {
            return Err(Error::VectorEngine(format!(
                "Query vector dimension mismatch for collection '{}': expected {} (got {})",
                name,
                collection.dimension,
                query_vector.len()
            )));
        }

        let candidates = collection
            .points
            .iter()
            .map(|p| Candidate {
                id: p.id.to_string(),
                vector_score: cosine_similarity(&query_vector, &p.vector),
                text: p.text.clone(),
                metadata: p.metadata.clone(),
            })
            .collect();

        Ok(Ranker::new(self.bm25_weight)
            .rank_hybrid(query_text, candidates, top_k)
            .into_iter()
            .map(|r| ScoredSegment {
                id: r.id,
                score: r.score,
                text: r.text,
                metadata: r.metadata,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::INDEXED_FILE_ID_KEY;
    use serde_json::{Map, Value};

    fn point(file_id: &str, text: &str, vector: Vec<f32>) -> SegmentPoint {
        let mut metadata = Map::new();
        metadata.insert(INDEXED_FILE_ID_KEY.to_string(), Value::from(file_id));
        SegmentPoint {
            id: Uuid::new_v4(),
            text: text.to_string(),
            metadata,
            vector,
        }
    }

    #[tokio::test]
    async fn test_collection_lifecycle() {
        let engine = MemoryVectorEngine::default();
        assert!(!engine.has_collection("kb1").await.unwrap());

        engine.create_collection("kb1", 2).await.unwrap();
        assert!(engine.create_collection("kb1", 2).await.is_err());

        engine.rename_collection("kb1", "kb2").await.unwrap();
        assert!(!engine.has_collection("kb1").await.unwrap());
        assert!(engine.has_collection("kb2").await.unwrap());

        assert!(engine.drop_collection("kb2").await.unwrap());
        assert!(!engine.drop_collection("kb2").await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_missing_or_taken_fails() {
        let engine = MemoryVectorEngine::default();
        assert!(engine.rename_collection("nope", "other").await.is_err());

        engine.create_collection("a", 2).await.unwrap();
        engine.create_collection("b", 2).await.unwrap();
        assert!(engine.rename_collection("a", "b").await.is_err());
        assert!(engine.has_collection("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_rejects_dimension_mismatch() {
        let engine = MemoryVectorEngine::default();
        engine.create_collection("kb", 3).await.unwrap();

        let err = engine
            .upsert("kb", vec![point("f", "t", vec![0.1, 0.2])])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[tokio::test]
    async fn test_query_count_delete_by_file() {
        let engine = MemoryVectorEngine::default();
        engine.create_collection("kb", 2).await.unwrap();
        engine
            .upsert(
                "kb",
                vec![
                    point("a", "a0", vec![1.0, 0.0]),
                    point("b", "b0", vec![0.0, 1.0]),
                    point("a", "a1", vec![1.0, 1.0]),
                    point("a", "a2", vec![1.0, 0.5]),
                ],
            )
            .await
            .unwrap();

        let filter = SegmentFilter::file("a");
        assert_eq!(engine.count("kb", &filter).await.unwrap(), 3);
        assert_eq!(engine.count("kb", &SegmentFilter::all()).await.unwrap(), 4);

        let page = engine.query("kb", &filter, 2, 1).await.unwrap();
        let texts: Vec<&str> = page.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["a1", "a2"]);

        engine.delete("kb", &filter).await.unwrap();
        assert_eq!(engine.count("kb", &SegmentFilter::all()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id_after_delete() {
        let engine = MemoryVectorEngine::default();
        engine.create_collection("kb", 2).await.unwrap();

        let gone = point("a", "gone", vec![1.0, 0.0]);
        let kept = point("b", "old", vec![0.0, 1.0]);
        engine.upsert("kb", vec![gone, kept.clone()]).await.unwrap();
        engine.delete("kb", &SegmentFilter::file("a")).await.unwrap();

        let replacement = SegmentPoint {
            text: "new".to_string(),
            ..kept
        };
        engine.upsert("kb", vec![replacement]).await.unwrap();
        engine.upsert("kb", vec![point("c", "fresh", vec![1.0, 1.0])]).await.unwrap();

        let rows = engine.query("kb", &SegmentFilter::all(), 10, 0).await.unwrap();
        let texts: Vec<&str> = rows.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["new", "fresh"]);
    }

    #[tokio::test]
    async fn test_hybrid_search_prefers_nearest() {
        let engine = MemoryVectorEngine::new(0.0);
        engine.create_collection("kb", 2).await.unwrap();
        engine
            .upsert(
                "kb",
                vec![
                    point("a", "east", vec![1.0, 0.0]),
                    point("a", "north", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let results = engine
            .hybrid_search("kb", "which way", vec![0.1, 0.9], 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "north");
    }

    #[tokio::test]
    async fn test_operations_on_missing_collection_fail() {
        let engine = MemoryVectorEngine::default();
        assert!(engine.upsert("none", Vec::new()).await.is_err());
        assert!(engine.count("none", &SegmentFilter::all()).await.is_err());
        assert!(engine
            .hybrid_search("none", "q", vec![1.0], 3)
            .await
            .is_err());
    }
}
