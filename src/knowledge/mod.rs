//! Knowledge base lifecycle and retrieval
//!
//! [`KnowledgeService`] owns the operations callers use: create, update,
//! delete, add and remove files, search, and chunk inspection. It keeps the
//! relational record and the backing vector collection in step, and hands
//! newly added files to ingestion only after they are committed.

mod lifecycle;
mod retrieval;
#[cfg(test)]
mod testing;

pub use lifecycle::*;
pub use retrieval::*;

use crate::chunk::ProcessOptions;
use crate::config::Config;
use crate::embed::{ModelRegistry, ModelResolver};
use crate::error::{Error, Result};
use crate::graph::graph_indexer;
use crate::ingest::{FilePipeline, IngestionDispatcher, Scheduler};
use crate::lineage::{LineageRecorder, SqliteLineageRecorder};
use crate::meta::{KnowledgeBase, MetaDb};
use crate::sources::{DatasetFileResolver, FileResolver};
use crate::store::{self, VectorEngine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub size: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, page: u64, size: u64, total: u64) -> Self {
        Self {
            items,
            page,
            size,
            total,
            total_pages: total.div_ceil(size.max(1)),
        }
    }
}

/// Reject non-positive paging arguments; returns the row offset
pub(crate) fn page_offset(page: u64, size: u64) -> Result<u64> {
    if page == 0 || size == 0 {
        return Err(Error::Validation(format!(
            "page and size must be positive (got page {}, size {})",
            page, size
        )));
    }
    Ok((page - 1) * size)
}

/// Entry point for knowledge-base operations
pub struct KnowledgeService {
    db: MetaDb,
    engine: Arc<dyn VectorEngine>,
    models: Arc<dyn ModelResolver>,
    files: Arc<dyn FileResolver>,
    lineage: Arc<dyn LineageRecorder>,
    dispatcher: IngestionDispatcher,
    default_options: ProcessOptions,
}

impl KnowledgeService {
    pub fn new(
        db: MetaDb,
        engine: Arc<dyn VectorEngine>,
        models: Arc<dyn ModelResolver>,
        files: Arc<dyn FileResolver>,
        lineage: Arc<dyn LineageRecorder>,
        dispatcher: IngestionDispatcher,
        default_options: ProcessOptions,
    ) -> Self {
        Self {
            db,
            engine,
            models,
            files,
            lineage,
            dispatcher,
            default_options,
        }
    }

    /// Wire every collaborator from configuration
    pub async fn from_config(config: &Config) -> Result<Self> {
        let db = MetaDb::connect(config).await?;
        if !db.is_initialized().await? {
            return Err(Error::NotInitialized);
        }

        let engine = store::connect(config)?;
        let models: Arc<dyn ModelResolver> = Arc::new(ModelRegistry::new(config));
        let files: Arc<dyn FileResolver> = Arc::new(DatasetFileResolver::new(db.clone()));

        let pipeline = FilePipeline::new(
            db.clone(),
            engine.clone(),
            models.clone(),
            files.clone(),
            config.ingestion.embed_batch_size,
        );
        let dispatcher = IngestionDispatcher::new(
            db.clone(),
            Scheduler::new(config.ingestion.max_concurrent_files),
            Arc::new(pipeline),
            graph_indexer(&config.graph)?,
        );

        Ok(Self::new(
            db.clone(),
            engine,
            models,
            files,
            Arc::new(SqliteLineageRecorder::new(db)),
            dispatcher,
            config.chunk.clone(),
        ))
    }

    pub fn db(&self) -> &MetaDb {
        &self.db
    }

    pub fn engine(&self) -> &Arc<dyn VectorEngine> {
        &self.engine
    }

    pub fn dispatcher(&self) -> &IngestionDispatcher {
        &self.dispatcher
    }

    /// Wait for all triggered ingestion to finish
    pub async fn wait_idle(&self) {
        self.dispatcher.wait_idle().await;
    }

    async fn require(&self, knowledge_base_id: &str) -> Result<KnowledgeBase> {
        self.db
            .get_knowledge_base(knowledge_base_id)
            .await?
            .ok_or_else(|| Error::KnowledgeBaseNotFound(knowledge_base_id.to_string()))
    }

    /// Look up by id, falling back to name
    pub async fn resolve(&self, id_or_name: &str) -> Result<KnowledgeBase> {
        if let Some(kb) = self.db.get_knowledge_base(id_or_name).await? {
            return Ok(kb);
        }
        self.db
            .get_knowledge_base_by_name(id_or_name)
            .await?
            .ok_or_else(|| Error::KnowledgeBaseNotFound(id_or_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_math() {
        let page: Paged<u8> = Paged::new(Vec::new(), 1, 10, 21);
        assert_eq!(page.total_pages, 3);
        assert_eq!(Paged::<u8>::new(Vec::new(), 1, 10, 0).total_pages, 0);
        assert_eq!(page_offset(3, 10).unwrap(), 20);
        assert!(matches!(page_offset(0, 10), Err(Error::Validation(_))));
        assert!(page_offset(1, 0).is_err());
    }
}
