//! Search and inspection over knowledge bases

use super::{page_offset, KnowledgeService, Paged};
use crate::config::MAX_TOP_K;
use crate::error::{Error, Result};
use crate::meta::KnowledgeBase;
use crate::store::{ScoredSegment, SegmentFilter, SegmentRow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Knowledge base with relational file and chunk totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseSummary {
    #[serde(flatten)]
    pub knowledge_base: KnowledgeBase,
    pub file_count: i64,
    pub chunk_count: i64,
}

/// A search result with metadata rendered as a JSON string
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub metadata: String,
}

/// A stored segment with metadata rendered as a JSON string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkView {
    pub id: String,
    pub text: String,
    pub metadata: String,
}

fn render(metadata: &Map<String, Value>) -> Result<String> {
    Ok(serde_json::to_string(metadata)?)
}

impl TryFrom<ScoredSegment> for SearchHit {
    type Error = Error;

    fn try_from(segment: ScoredSegment) -> Result<Self> {
        Ok(Self {
            metadata: render(&segment.metadata)?,
            id: segment.id,
            score: segment.score,
            text: segment.text,
        })
    }
}

impl TryFrom<SegmentRow> for ChunkView {
    type Error = Error;

    fn try_from(row: SegmentRow) -> Result<Self> {
        Ok(Self {
            metadata: render(&row.metadata)?,
            id: row.id,
            text: row.text,
        })
    }
}

impl KnowledgeService {
    /// Hybrid search within one knowledge base
    pub async fn search(
        &self,
        knowledge_base_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(Error::Validation("query must not be empty".to_string()));
        }
        if top_k == 0 || top_k > MAX_TOP_K {
            return Err(Error::Validation(format!(
                "top_k must be between 1 and {}",
                MAX_TOP_K
            )));
        }

        let kb = self.require(knowledge_base_id).await?;
        if !self.engine.has_collection(&kb.name).await? {
            debug!("Knowledge base {} has no collection yet", kb.name);
            return Ok(Vec::new());
        }

        let embedder = self.models.embedding_model(&kb.embedding_model).await?;
        let vector = embedder.embed_one(query).await?;
        let hits = self
            .engine
            .hybrid_search(&kb.name, query, vector, top_k)
            .await?;
        debug!("Search in {} returned {} hits", kb.name, hits.len());

        hits.into_iter().map(SearchHit::try_from).collect()
    }

    /// Page through the segments of one file
    pub async fn list_chunks(
        &self,
        knowledge_base_id: &str,
        file_id: &str,
        page: u64,
        size: u64,
    ) -> Result<Paged<ChunkView>> {
        let offset = page_offset(page, size)?;
        let kb = self.require(knowledge_base_id).await?;
        if !self.engine.has_collection(&kb.name).await? {
            return Ok(Paged::new(Vec::new(), page, size, 0));
        }

        let filter = SegmentFilter::file(file_id);
        let rows = self
            .engine
            .query(&kb.name, &filter, size as usize, offset as usize)
            .await?;
        let total = self.engine.count(&kb.name, &filter).await?;

        let items = rows
            .into_iter()
            .map(ChunkView::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Paged::new(items, page, size, total))
    }

    /// One knowledge base with its totals
    pub async fn get(&self, knowledge_base_id: &str) -> Result<KnowledgeBaseSummary> {
        let kb = self.require(knowledge_base_id).await?;
        self.summarize(kb).await
    }

    /// Page through knowledge bases, newest first
    pub async fn list(&self, page: u64, size: u64) -> Result<Paged<KnowledgeBaseSummary>> {
        let offset = page_offset(page, size)?;
        let kbs = self
            .db
            .list_knowledge_bases_page(size as i64, offset as i64)
            .await?;
        let total = self.db.count_knowledge_bases().await?;

        let mut items = Vec::with_capacity(kbs.len());
        for kb in kbs {
            items.push(self.summarize(kb).await?);
        }
        Ok(Paged::new(items, page, size, total as u64))
    }

    async fn summarize(&self, knowledge_base: KnowledgeBase) -> Result<KnowledgeBaseSummary> {
        let stats = self.db.knowledge_base_stats(&knowledge_base.id).await?;
        Ok(KnowledgeBaseSummary {
            knowledge_base,
            file_count: stats.file_count,
            chunk_count: stats.chunk_count,
        })
    }
}
