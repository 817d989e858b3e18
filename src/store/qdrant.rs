//! Qdrant-backed vector engine
//!
//! Knowledge-base names are Qdrant aliases. Each alias points at a physical
//! collection with a generated name, which makes rename a single atomic alias
//! operation and keeps the physical collection untouched.

use super::payload::{row_from_payload, METADATA_FIELD, TEXT_FIELD};
use super::{ScoredSegment, SegmentFilter, SegmentPoint, SegmentRow, VectorEngine};
use crate::error::{Error, Result};
use crate::rank::{Candidate, Ranker};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateAliasBuilder, CreateCollectionBuilder,
    CreateFieldIndexCollectionBuilder, DeletePointsBuilder, Distance, FieldType, Filter,
    Query, QueryPointsBuilder, RenameAliasBuilder, ScalarQuantizationBuilder, ScoredPoint,
    UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Candidates fetched from each half of a hybrid query, per requested result
const PREFETCH_FACTOR: u64 = 4;

/// Qdrant store handle
pub struct QdrantVectorEngine {
    client: Qdrant,
    bm25_weight: f32,
}

impl QdrantVectorEngine {
    /// Create a client for the Qdrant gRPC endpoint at `url`
    pub fn new(url: &str, api_key: Option<String>, bm25_weight: f32) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .skip_compatibility_check()
            .build()
            .map_err(|e| Error::VectorEngine(e.to_string()))?;

        Ok(Self { client, bm25_weight })
    }

    /// Physical collection behind a knowledge-base alias
    async fn resolve(&self, name: &str) -> Result<Option<String>> {
        let aliases = self.client.list_aliases().await?;
        Ok(aliases
            .aliases
            .into_iter()
            .find(|a| a.alias_name == name)
            .map(|a| a.collection_name))
    }

    async fn require(&self, name: &str) -> Result<String> {
        self.resolve(name)
            .await?
            .ok_or_else(|| Error::VectorEngine(format!("Collection '{}' does not exist", name)))
    }
}

fn physical_collection_name() -> String {
    format!("kb_{}", Uuid::new_v4().simple())
}

fn metadata_field(key: &str) -> String {
    format!("{}.{}", METADATA_FIELD, key)
}

/// Translate a segment filter; `None` means unfiltered
fn to_qdrant_filter(filter: &SegmentFilter) -> Option<Filter> {
    let ids = filter.indexed_file_ids.as_ref()?;
    Some(Filter::must([Condition::matches(
        metadata_field(super::INDEXED_FILE_ID_KEY),
        ids.clone(),
    )]))
}

/// Nearest neighbours restricted to points whose text matches the query terms
fn lexical_query(name: &str, query_text: &str, query_vector: Vec<f32>, limit: u64) -> QueryPointsBuilder {
    QueryPointsBuilder::new(name)
        .query(Query::new_nearest(query_vector))
        .filter(Filter::must([Condition::matches_text(
            TEXT_FIELD,
            query_text.to_string(),
        )]))
        .limit(limit)
        .with_payload(true)
}

/// Merge the dense and text-matched candidate sets and rescore them with BM25
fn fuse_candidates(
    query_text: &str,
    dense: Vec<ScoredSegment>,
    lexical: Vec<ScoredSegment>,
    bm25_weight: f32,
    top_k: usize,
) -> Vec<ScoredSegment> {
    let mut seen = HashSet::new();
    let candidates = dense
        .into_iter()
        .chain(lexical)
        .filter(|s| seen.insert(s.id.clone()))
        .map(|s| Candidate {
            id: s.id,
            vector_score: s.score,
            text: s.text,
            metadata: s.metadata,
        })
        .collect();

    Ranker::new(bm25_weight)
        .rank_hybrid(query_text, candidates, top_k)
        .into_iter()
        .map(|r| ScoredSegment {
            id: r.id,
            score: r.score,
            text: r.text,
            metadata: r.metadata,
        })
        .collect()
}

fn scored_from_point(point: ScoredPoint) -> ScoredSegment {
    let score = point.score;
    let row = row_from_payload(point.id, point.payload);
    ScoredSegment {
        id: row.id,
        score,
        text: row.text,
        metadata: row.metadata,
    }
}

#[async_trait]
impl VectorEngine for QdrantVectorEngine {
    fn backend(&self) -> &'static str {
        "qdrant"
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        Ok(self.resolve(name).await?.is_some())
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        if self.resolve(name).await?.is_some() {
            return Err(Error::VectorEngine(format!(
                "Collection '{}' already exists",
                name
            )));
        }

        let physical = physical_collection_name();
        info!(
            "Creating collection {} ({}) with dimension {}",
            name, physical, dimension
        );

        let vectors_config = VectorParamsBuilder::new(dimension as u64, Distance::Cosine);
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&physical)
                    .vectors_config(vectors_config)
                    .quantization_config(ScalarQuantizationBuilder::default()),
            )
            .await?;

        let indexed = async {
            self.client
                .create_field_index(
                    CreateFieldIndexCollectionBuilder::new(&physical, TEXT_FIELD, FieldType::Text)
                        .wait(true),
                )
                .await?;
            self.client
                .create_field_index(
                    CreateFieldIndexCollectionBuilder::new(
                        &physical,
                        metadata_field(super::INDEXED_FILE_ID_KEY),
                        FieldType::Keyword,
                    )
                    .wait(true),
                )
                .await?;
            self.client
                .create_alias(CreateAliasBuilder::new(&physical, name))
                .await?;
            Ok::<(), qdrant_client::QdrantError>(())
        }
        .await;

        if let Err(e) = indexed {
            if let Err(cleanup) = self.client.delete_collection(&physical).await {
                warn!("Failed to clean up collection {}: {}", physical, cleanup);
            }
            return Err(e.into());
        }

        Ok(())
    }

    async fn rename_collection(&self, old: &str, new: &str) -> Result<()> {
        self.require(old).await?;
        if self.resolve(new).await?.is_some() {
            return Err(Error::VectorEngine(format!(
                "Collection '{}' already exists",
                new
            )));
        }

        info!("Renaming collection {} to {}", old, new);
        self.client
            .rename_alias(RenameAliasBuilder::new(old, new))
            .await?;
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        let Some(physical) = self.resolve(name).await? else {
            return Ok(false);
        };

        info!("Deleting collection {} ({})", name, physical);
        self.client.delete_alias(name).await?;
        self.client.delete_collection(&physical).await?;
        Ok(true)
    }

    async fn upsert(&self, name: &str, points: Vec<SegmentPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        debug!("Upserting {} points to collection {}", points.len(), name);

        let point_structs = points.into_iter().map(|p| p.to_point_struct()).collect::<Vec<_>>();
        self.client
            .upsert_points(UpsertPointsBuilder::new(name, point_structs).wait(true))
            .await?;
        Ok(())
    }

    async fn delete(&self, name: &str, filter: &SegmentFilter) -> Result<()> {
        let filter = to_qdrant_filter(filter).unwrap_or_default();

        debug!("Deleting points from collection {}", name);
        self.client
            .delete_points(DeletePointsBuilder::new(name).points(filter).wait(true))
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        filter: &SegmentFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SegmentRow>> {
        let mut builder = QueryPointsBuilder::new(name)
            .limit(limit as u64)
            .offset(offset as u64)
            .with_payload(true);
        if let Some(f) = to_qdrant_filter(filter) {
            builder = builder.filter(f);
        }

        let response = self.client.query(builder).await?;
        Ok(response
            .result
            .into_iter()
            .map(|p| row_from_payload(p.id, p.payload))
            .collect())
    }

    async fn count(&self, name: &str, filter: &SegmentFilter) -> Result<u64> {
        let mut builder = CountPointsBuilder::new(name).exact(true);
        if let Some(f) = to_qdrant_filter(filter) {
            builder = builder.filter(f);
        }

        let response = self.client.count(builder).await?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn hybrid_search(
        &self,
        name: &str,
        query_text: &str,
        query_vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredSegment>> {
        debug!("Hybrid search in collection {} with limit {}", name, top_k);

        let candidates = top_k as u64 * PREFETCH_FACTOR;
        let dense = QueryPointsBuilder::new(name)
            .query(Query::new_nearest(query_vector.clone()))
            .limit(candidates)
            .with_payload(true);
        let dense = self.client.query(dense).await?;
        let lexical = self
            .client
            .query(lexical_query(name, query_text, query_vector, candidates))
            .await?;

        let dense: Vec<ScoredSegment> = dense.result.into_iter().map(scored_from_point).collect();
        let lexical: Vec<ScoredSegment> = lexical.result.into_iter().map(scored_from_point).collect();
        debug!(
            dense = dense.len(),
            lexical = lexical.len(),
            "Fusing hybrid candidates"
        );
        Ok(fuse_candidates(query_text, dense, lexical, self.bm25_weight, top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::condition::ConditionOneOf;
    use qdrant_client::qdrant::r#match::MatchValue;

    #[test]
    fn test_unfiltered_has_no_qdrant_filter() {
        assert!(to_qdrant_filter(&SegmentFilter::all()).is_none());
    }

    #[test]
    fn test_file_filter_targets_metadata_field() {
        let filter = to_qdrant_filter(&SegmentFilter::files(vec!["a".into(), "b".into()])).unwrap();
        assert_eq!(filter.must.len(), 1);

        let Some(ConditionOneOf::Field(field)) = &filter.must[0].condition_one_of else {
            panic!("expected a field condition");
        };
        assert_eq!(field.key, "metadata.indexed_file_id");
        let value = field.r#match.as_ref().and_then(|m| m.match_value.clone());
        assert!(matches!(value, Some(MatchValue::Keywords(ref k)) if k.strings == vec!["a", "b"]));
    }

    #[test]
    fn test_physical_names_are_unique_identifiers() {
        let a = physical_collection_name();
        let b = physical_collection_name();
        assert_ne!(a, b);
        assert!(a.starts_with("kb_"));
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[tokio::test]
    async fn test_client_builds_without_server() {
        assert!(QdrantVectorEngine::new("http://127.0.0.1:6334", None, 0.3).is_ok());
    }

    fn segment(id: &str, score: f32, text: &str) -> ScoredSegment {
        ScoredSegment {
            id: id.to_string(),
            score,
            text: text.to_string(),
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_fusion_ranks_lexical_matches_by_term_relevance() {
        let dense = vec![
            segment("near", 0.80, "notes about gardening and soil"),
            segment("weak", 0.55, "a cooking pasta recipe"),
        ];
        let lexical = vec![
            segment("weak", 0.55, "a cooking pasta recipe"),
            segment("strong", 0.50, "pasta pasta cooking: fresh pasta recipe"),
        ];

        let fused = fuse_candidates("pasta recipe", dense, lexical, 0.5, 10);
        let ids: Vec<&str> = fused.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[2], "near");
        assert!(fused.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_fusion_dedupes_and_truncates() {
        let dense = vec![segment("a", 0.9, "x"), segment("b", 0.8, "y")];
        let lexical = vec![segment("a", 0.9, "x")];

        let fused = fuse_candidates("q", dense, lexical, 0.0, 1);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].id, "a");
    }

    #[test]
    fn test_lexical_query_is_ranked_and_text_filtered() {
        let request = lexical_query("kb", "pasta", vec![0.1, 0.2], 8).build();
        assert!(request.query.is_some());
        let filter = request.filter.unwrap();
        assert_eq!(filter.must.len(), 1);
        let Some(ConditionOneOf::Field(field)) = &filter.must[0].condition_one_of else {
            panic!("expected a field condition");
        };
        assert_eq!(field.key, TEXT_FIELD);
        assert_eq!(request.limit, Some(8));
    }
}
