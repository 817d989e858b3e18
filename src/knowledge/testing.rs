//! Service wiring over in-process collaborators for lifecycle and retrieval tests

use super::{FileRef, KnowledgeService};
use crate::chunk::ProcessOptions;
use crate::embed::testing::StaticModels;
use crate::error::{Error, Result};
use crate::graph::GraphIndexer;
use crate::ingest::{FilePipeline, IngestionDispatcher, Scheduler};
use crate::lineage::SqliteLineageRecorder;
use crate::meta::{DatasetFile, MetaDb};
use crate::sources::DatasetFileResolver;
use crate::store::{
    MemoryVectorEngine, ScoredSegment, SegmentFilter, SegmentPoint, SegmentRow, VectorEngine,
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const DIMENSION: usize = 16;

#[derive(Default)]
pub struct CountingGraph {
    pub calls: AtomicUsize,
}

#[async_trait]
impl GraphIndexer for CountingGraph {
    async fn start_graph_indexing(&self, _knowledge_base_id: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Delegates to an in-process engine; renames fail while `fail_rename` is set
pub struct FailingRename {
    pub inner: Arc<MemoryVectorEngine>,
    pub fail_rename: AtomicBool,
}

#[async_trait]
impl VectorEngine for FailingRename {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        self.inner.has_collection(name).await
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        self.inner.create_collection(name, dimension).await
    }

    async fn rename_collection(&self, old: &str, new: &str) -> Result<()> {
        if self.fail_rename.load(Ordering::SeqCst) {
            return Err(Error::VectorEngine(format!("rename {} -> {} refused", old, new)));
        }
        self.inner.rename_collection(old, new).await
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        self.inner.drop_collection(name).await
    }

    async fn upsert(&self, name: &str, points: Vec<SegmentPoint>) -> Result<()> {
        self.inner.upsert(name, points).await
    }

    async fn delete(&self, name: &str, filter: &SegmentFilter) -> Result<()> {
        self.inner.delete(name, filter).await
    }

    async fn query(
        &self,
        name: &str,
        filter: &SegmentFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SegmentRow>> {
        self.inner.query(name, filter, limit, offset).await
    }

    async fn count(&self, name: &str, filter: &SegmentFilter) -> Result<u64> {
        self.inner.count(name, filter).await
    }

    async fn hybrid_search(
        &self,
        name: &str,
        query_text: &str,
        query_vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredSegment>> {
        self.inner
            .hybrid_search(name, query_text, query_vector, top_k)
            .await
    }
}

pub struct Harness {
    pub service: KnowledgeService,
    pub engine: Arc<MemoryVectorEngine>,
    pub failing: Arc<FailingRename>,
    pub graph: Arc<CountingGraph>,
    tmp: TempDir,
}

impl Harness {
    pub fn path(&self, name: &str) -> PathBuf {
        self.tmp.path().join(name)
    }

    /// Write a fixture file into dataset "ds" and return a reference to it
    pub async fn source(&self, name: &str, content: &[u8]) -> FileRef {
        let path = self.path(name);
        std::fs::write(&path, content).unwrap();
        let file = DatasetFile::new(
            "ds".to_string(),
            name.to_string(),
            path.to_string_lossy().to_string(),
            crate::parse::file_type_of(&path).unwrap_or_default(),
        );
        self.service.db().insert_dataset_file(&file).await.unwrap();
        FileRef {
            source_file_id: file.id,
            file_name: name.to_string(),
        }
    }

    /// Hold one admission slot until the returned sender fires or drops
    pub async fn occupy_slot(&self) -> tokio::sync::oneshot::Sender<()> {
        let (release, held) = tokio::sync::oneshot::channel::<()>();
        self.service
            .dispatcher()
            .scheduler()
            .submit(async move {
                let _ = held.await;
            })
            .await
            .unwrap();
        release
    }
}

/// A service with scheduler `capacity` and model "embed"
pub async fn harness(capacity: usize) -> Harness {
    let tmp = TempDir::new().unwrap();
    let db = MetaDb::new(&tmp.path().join("meta.db")).await.unwrap();

    let engine = Arc::new(MemoryVectorEngine::default());
    let failing = Arc::new(FailingRename {
        inner: engine.clone(),
        fail_rename: AtomicBool::new(false),
    });
    let models = Arc::new(StaticModels::new("embed", DIMENSION));
    let files = Arc::new(DatasetFileResolver::new(db.clone()));
    let graph = Arc::new(CountingGraph::default());

    let pipeline = FilePipeline::new(
        db.clone(),
        failing.clone(),
        models.clone(),
        files.clone(),
        4,
    );
    let dispatcher = IngestionDispatcher::new(
        db.clone(),
        Scheduler::new(capacity),
        Arc::new(pipeline),
        graph.clone(),
    );
    let options = ProcessOptions {
        chunk_size: 64,
        overlap_size: 8,
        ..ProcessOptions::default()
    };

    let service = KnowledgeService::new(
        db.clone(),
        failing.clone(),
        models,
        files,
        Arc::new(SqliteLineageRecorder::new(db)),
        dispatcher,
        options,
    );

    Harness {
        service,
        engine,
        failing,
        graph,
        tmp,
    }
}
