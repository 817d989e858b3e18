//! Ingestion trigger and dispatch
//!
//! A trigger loads every file of a knowledge base that is not yet PROCESSED.
//! GRAPH knowledge bases are handed to the graph-indexing service in one call;
//! DOCUMENT knowledge bases submit one pipeline task per file to the shared
//! [`Scheduler`].

mod pipeline;
mod scheduler;

pub use pipeline::*;
pub use scheduler::*;

use crate::error::{Error, Result};
use crate::graph::GraphIndexer;
use crate::meta::{CommitEvent, CommitListener, KnowledgeBaseType, MetaDb};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

struct DispatcherInner {
    db: MetaDb,
    scheduler: Scheduler,
    pipeline: Arc<FilePipeline>,
    graph: Arc<dyn GraphIndexer>,
    dispatches: Mutex<JoinSet<()>>,
    /// Files queued or running; a file is never admitted twice at once
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Routes ingestion triggers to the scheduler or the graph service
#[derive(Clone)]
pub struct IngestionDispatcher {
    inner: Arc<DispatcherInner>,
}

/// Removes a file from the in-flight set when its task ends
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    file_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.file_id);
    }
}

impl IngestionDispatcher {
    pub fn new(
        db: MetaDb,
        scheduler: Scheduler,
        pipeline: Arc<FilePipeline>,
        graph: Arc<dyn GraphIndexer>,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                db,
                scheduler,
                pipeline,
                graph,
                dispatches: Mutex::new(JoinSet::new()),
                in_flight: Arc::new(Mutex::new(HashSet::new())),
            }),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Dispatch in the background; errors are logged
    pub fn trigger(&self, knowledge_base_id: &str) {
        let this = self.clone();
        let knowledge_base_id = knowledge_base_id.to_string();
        let mut dispatches = self
            .inner
            .dispatches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        dispatches.spawn(async move {
            if let Err(e) = this.dispatch(&knowledge_base_id).await {
                error!(
                    knowledge_base_id = %knowledge_base_id,
                    error = %e,
                    "Ingestion dispatch failed"
                );
            }
        });
    }

    /// Load pending files and hand them off. Returns how many file tasks were
    /// submitted; waits while the scheduler is full.
    pub async fn dispatch(&self, knowledge_base_id: &str) -> Result<usize> {
        let kb = self
            .inner
            .db
            .get_knowledge_base(knowledge_base_id)
            .await?
            .ok_or_else(|| Error::KnowledgeBaseNotFound(knowledge_base_id.to_string()))?;
        let pending = self.inner.db.list_pending_files(&kb.id).await?;

        if kb.get_type()? == KnowledgeBaseType::Graph {
            info!(
                "Delegating {} pending files of {} to the graph service",
                pending.len(),
                kb.name
            );
            if let Err(e) = self.inner.graph.start_graph_indexing(&kb.id).await {
                warn!("Graph indexing for {} could not be started: {}", kb.name, e);
            }
            return Ok(0);
        }

        info!("Dispatching {} pending files of {}", pending.len(), kb.name);
        let kb = Arc::new(kb);
        let mut submitted = 0;
        for file in pending {
            let fresh = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(file.id.clone());
            if !fresh {
                debug!("File {} is already queued, skipping", file.id);
                continue;
            }

            let guard = InFlightGuard {
                in_flight: self.inner.in_flight.clone(),
                file_id: file.id.clone(),
            };
            let pipeline = self.inner.pipeline.clone();
            let kb = kb.clone();
            self.inner
                .scheduler
                .submit(async move {
                    let _guard = guard;
                    pipeline.run(&kb, &file).await;
                })
                .await?;
            submitted += 1;
        }

        Ok(submitted)
    }

    /// Wait for every triggered dispatch and every admitted file task
    pub async fn wait_idle(&self) {
        loop {
            let dispatched = drain_tasks(&self.inner.dispatches).await;
            let ran = self.inner.scheduler.drain().await;
            if dispatched == 0 && ran == 0 {
                return;
            }
        }
    }
}

impl CommitListener for IngestionDispatcher {
    fn committed(&self, event: &CommitEvent) {
        match event {
            CommitEvent::FilesAdded {
                knowledge_base_id,
                indexed_file_ids,
            } => {
                debug!(
                    "{} files committed to {}, triggering ingestion",
                    indexed_file_ids.len(),
                    knowledge_base_id
                );
                self.trigger(knowledge_base_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ProcessOptions;
    use crate::embed::testing::StaticModels;
    use crate::meta::{FileStatus, IndexedFile, KnowledgeBase};
    use crate::sources::DatasetFileResolver;
    use crate::store::MemoryVectorEngine;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingGraph {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GraphIndexer for CountingGraph {
        async fn start_graph_indexing(&self, _knowledge_base_id: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn dispatcher(tmp: &TempDir, graph: Arc<CountingGraph>) -> (MetaDb, IngestionDispatcher) {
        let db = MetaDb::new(&tmp.path().join("meta.db")).await.unwrap();
        let pipeline = FilePipeline::new(
            db.clone(),
            Arc::new(MemoryVectorEngine::default()),
            Arc::new(StaticModels::new("embed", 8)),
            Arc::new(DatasetFileResolver::new(db.clone())),
            20,
        );
        let dispatcher = IngestionDispatcher::new(db.clone(), Scheduler::new(2), Arc::new(pipeline), graph);
        (db, dispatcher)
    }

    async fn kb_with_files(db: &MetaDb, kb_type: KnowledgeBaseType, count: usize) -> (KnowledgeBase, Vec<IndexedFile>) {
        let kb = KnowledgeBase::new("kb".into(), None, kb_type, "embed".into(), None);
        db.insert_knowledge_base(&kb).await.unwrap();
        let files: Vec<IndexedFile> = (0..count)
            .map(|i| IndexedFile::new(kb.id.clone(), format!("missing-{}", i), format!("f{}.txt", i), &ProcessOptions::default()))
            .collect();
        let mut scope = db.begin().await.unwrap();
        scope.insert_indexed_files(&files).await.unwrap();
        scope.commit().await.unwrap();
        (kb, files)
    }

    #[tokio::test]
    async fn test_graph_knowledge_base_skips_pipeline() {
        let tmp = TempDir::new().unwrap();
        let graph = Arc::new(CountingGraph::default());
        let (db, dispatcher) = dispatcher(&tmp, graph.clone()).await;
        let (kb, files) = kb_with_files(&db, KnowledgeBaseType::Graph, 3).await;

        dispatcher.trigger(&kb.id);
        tokio::time::timeout(Duration::from_secs(5), dispatcher.wait_idle())
            .await
            .unwrap();

        assert_eq!(graph.calls.load(Ordering::SeqCst), 1);
        for file in files {
            let row = db.get_indexed_file(&file.id).await.unwrap().unwrap();
            assert_eq!(row.get_status().unwrap(), FileStatus::Unprocessed);
        }
    }

    #[tokio::test]
    async fn test_commit_event_triggers_dispatch_to_terminal_states() {
        let tmp = TempDir::new().unwrap();
        let graph = Arc::new(CountingGraph::default());
        let (db, dispatcher) = dispatcher(&tmp, graph.clone()).await;
        let (kb, files) = kb_with_files(&db, KnowledgeBaseType::Document, 5).await;

        dispatcher.committed(&CommitEvent::FilesAdded {
            knowledge_base_id: kb.id.clone(),
            indexed_file_ids: files.iter().map(|f| f.id.clone()).collect(),
        });
        tokio::time::timeout(Duration::from_secs(10), dispatcher.wait_idle())
            .await
            .unwrap();

        // Sources are unknown, so every file fails, but every file terminates
        for file in &files {
            let row = db.get_indexed_file(&file.id).await.unwrap().unwrap();
            assert_eq!(row.get_status().unwrap(), FileStatus::ProcessFailed);
        }
        assert_eq!(graph.calls.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.scheduler().available(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_knowledge_base() {
        let tmp = TempDir::new().unwrap();
        let (_db, dispatcher) = dispatcher(&tmp, Arc::new(CountingGraph::default())).await;
        let err = dispatcher.dispatch("nope").await.unwrap_err();
        assert!(matches!(err, Error::KnowledgeBaseNotFound(_)));
    }

    #[tokio::test]
    async fn test_processed_files_are_not_redispatched() {
        let tmp = TempDir::new().unwrap();
        let (db, dispatcher) = dispatcher(&tmp, Arc::new(CountingGraph::default())).await;
        let (kb, files) = kb_with_files(&db, KnowledgeBaseType::Document, 2).await;
        db.mark_processed(&files[0].id).await.unwrap();

        assert_eq!(dispatcher.dispatch(&kb.id).await.unwrap(), 1);
        dispatcher.wait_idle().await;
    }
}
