//! Per-file indexing pipeline
//!
//! Resolve, parse, annotate, split, count, embed and upsert, in that order.
//! Every error is caught at the task boundary and recorded on the file row.

use crate::chunk::Splitter;
use crate::embed::ModelResolver;
use crate::error::{Error, Result};
use crate::meta::{FileStatus, IndexedFile, KnowledgeBase, MetaDb};
use crate::parse::parse_file;
use crate::sources::FileResolver;
use crate::store::{SegmentPoint, VectorEngine, INDEXED_FILE_ID_KEY, SOURCE_FILE_ID_KEY};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Collaborators shared by every file pipeline
pub struct FilePipeline {
    db: MetaDb,
    engine: Arc<dyn VectorEngine>,
    models: Arc<dyn ModelResolver>,
    files: Arc<dyn FileResolver>,
    embed_batch_size: usize,
    /// Serializes lazy collection creation
    collection_lock: Mutex<()>,
}

impl FilePipeline {
    pub fn new(
        db: MetaDb,
        engine: Arc<dyn VectorEngine>,
        models: Arc<dyn ModelResolver>,
        files: Arc<dyn FileResolver>,
        embed_batch_size: usize,
    ) -> Self {
        Self {
            db,
            engine,
            models,
            files,
            embed_batch_size: embed_batch_size.max(1),
            collection_lock: Mutex::new(()),
        }
    }

    /// Process one file to a terminal status. Never fails. Returns `None`
    /// when the file row was deleted before processing started.
    pub async fn run(&self, kb: &KnowledgeBase, file: &IndexedFile) -> Option<FileStatus> {
        let status = match self.process(kb, file).await {
            Ok(None) => {
                debug!(file_id = %file.id, "File was removed while queued, skipping");
                return None;
            }
            Ok(Some(segments)) => match self.db.mark_processed(&file.id).await {
                Ok(()) => {
                    info!(
                        file_id = %file.id,
                        knowledge_base_id = %kb.id,
                        "Indexed {} ({} segments)",
                        file.file_name,
                        segments
                    );
                    FileStatus::Processed
                }
                Err(e) => self.fail(kb, file, &e).await,
            },
            Err(e) => self.fail(kb, file, &e).await,
        };
        Some(status)
    }

    async fn fail(&self, kb: &KnowledgeBase, file: &IndexedFile, err: &Error) -> FileStatus {
        error!(
            file_id = %file.id,
            knowledge_base_id = %kb.id,
            error = %err,
            "Failed to process {}",
            file.file_name
        );
        if let Err(e) = self.db.mark_failed(&file.id, &err.to_string()).await {
            warn!("Could not record failure for file {}: {}", file.id, e);
        }
        FileStatus::ProcessFailed
    }

    async fn process(&self, kb: &KnowledgeBase, file: &IndexedFile) -> Result<Option<usize>> {
        if !self.db.mark_processing(&file.id).await? {
            return Ok(None);
        }

        let source = self.files.resolve(&file.source_file_id).await?;
        debug!("Parsing {} as {:?}", source.path.display(), source.file_type);

        let path = source.path.clone();
        let file_type = source.file_type.clone();
        let mut doc = tokio::task::spawn_blocking(move || parse_file(&path, &file_type)).await??;

        doc.metadata
            .insert(INDEXED_FILE_ID_KEY.to_string(), Value::from(file.id.clone()));
        doc.metadata.insert(
            SOURCE_FILE_ID_KEY.to_string(),
            Value::from(file.source_file_id.clone()),
        );
        doc.metadata
            .insert("file_name".to_string(), Value::from(file.file_name.clone()));
        doc.metadata
            .insert("file_type".to_string(), Value::from(source.file_type));

        let splitter = Splitter::from_options(&file.options()?)?;
        let segments = splitter.split_document(&doc);
        self.db
            .set_chunk_count(&file.id, segments.len() as i64)
            .await?;
        debug!("Split {} into {} segments", file.file_name, segments.len());

        let embedder = self.models.embedding_model(&kb.embedding_model).await?;
        self.ensure_collection(&kb.name, embedder.dimension()).await?;

        for batch in segments.chunks(self.embed_batch_size) {
            let texts: Vec<String> = batch.iter().map(|s| s.text.clone()).collect();
            let vectors = embedder.embed(texts).await?;
            if vectors.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            let points = batch
                .iter()
                .zip(vectors)
                .map(|(segment, vector)| SegmentPoint {
                    id: Uuid::new_v4(),
                    text: segment.text.clone(),
                    metadata: segment.metadata.clone(),
                    vector,
                })
                .collect();
            self.engine.upsert(&kb.name, points).await?;
        }

        Ok(Some(segments.len()))
    }

    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let _guard = self.collection_lock.lock().await;
        if !self.engine.has_collection(name).await? {
            info!("Creating collection {} (dimension {})", name, dimension);
            self.engine.create_collection(name, dimension).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkStrategy, ProcessOptions};
    use crate::embed::testing::StaticModels;
    use crate::meta::{DatasetFile, KnowledgeBaseType};
    use crate::sources::DatasetFileResolver;
    use crate::store::{MemoryVectorEngine, SegmentFilter};
    use tempfile::TempDir;

    struct Fixture {
        db: MetaDb,
        engine: Arc<MemoryVectorEngine>,
        pipeline: FilePipeline,
        kb: KnowledgeBase,
        tmp: TempDir,
    }

    async fn fixture(batch_size: usize) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("meta.db")).await.unwrap();
        let engine = Arc::new(MemoryVectorEngine::default());
        let pipeline = FilePipeline::new(
            db.clone(),
            engine.clone(),
            Arc::new(StaticModels::new("embed", 16)),
            Arc::new(DatasetFileResolver::new(db.clone())),
            batch_size,
        );
        let kb = KnowledgeBase::new(
            "docs".to_string(),
            None,
            KnowledgeBaseType::Document,
            "embed".to_string(),
            None,
        );
        db.insert_knowledge_base(&kb).await.unwrap();
        Fixture {
            db,
            engine,
            pipeline,
            kb,
            tmp,
        }
    }

    async fn add_file(f: &Fixture, name: &str, content: &[u8], options: &ProcessOptions) -> IndexedFile {
        let path = f.tmp.path().join(name);
        std::fs::write(&path, content).unwrap();
        let file_type = crate::parse::file_type_of(&path).unwrap_or_default();
        let source = DatasetFile::new(
            "ds".to_string(),
            name.to_string(),
            path.to_string_lossy().to_string(),
            file_type,
        );
        f.db.insert_dataset_file(&source).await.unwrap();

        let file = IndexedFile::new(f.kb.id.clone(), source.id.clone(), name.to_string(), options);
        let mut scope = f.db.begin().await.unwrap();
        scope.insert_indexed_files(std::slice::from_ref(&file)).await.unwrap();
        scope.commit().await.unwrap();
        file
    }

    #[tokio::test]
    async fn test_chunk_count_matches_splitter_output() {
        let f = fixture(2).await;
        let options = ProcessOptions {
            strategy: ChunkStrategy::Word,
            chunk_size: 24,
            overlap_size: 6,
            delimiter: None,
        };
        let text = "The quick brown fox jumps over the lazy dog while the cat sleeps in warm sun all day long.";
        let file = add_file(&f, "fox.txt", text.as_bytes(), &options).await;

        assert_eq!(f.pipeline.run(&f.kb, &file).await, Some(FileStatus::Processed));

        let expected = Splitter::from_options(&options)
            .unwrap()
            .split_document(&crate::parse::parse_file(&f.tmp.path().join("fox.txt"), "txt").unwrap())
            .len();
        let row = f.db.get_indexed_file(&file.id).await.unwrap().unwrap();
        assert_eq!(row.get_status().unwrap(), FileStatus::Processed);
        assert_eq!(row.chunk_count, Some(expected as i64));
        assert!(expected > 2);

        let stored = f
            .engine
            .count(&f.kb.name, &SegmentFilter::file(&file.id))
            .await
            .unwrap();
        assert_eq!(stored, expected as u64);

        let rows = f.engine.query(&f.kb.name, &SegmentFilter::all(), 100, 0).await.unwrap();
        assert!(rows.iter().all(|r| r.metadata["source_file_id"] == file.source_file_id.as_str()));
        assert!(rows.iter().all(|r| r.metadata["file_name"] == "fox.txt"));
    }

    #[tokio::test]
    async fn test_collection_created_lazily_with_model_dimension() {
        let f = fixture(20).await;
        assert!(!f.engine.has_collection("docs").await.unwrap());

        let file = add_file(&f, "a.md", b"# Title\n\nSome markdown body.", &ProcessOptions::default()).await;
        f.pipeline.run(&f.kb, &file).await;

        assert!(f.engine.has_collection("docs").await.unwrap());
        let hits = f
            .engine
            .hybrid_search("docs", "markdown", vec![0.0; 16], 5)
            .await
            .unwrap();
        assert!(!hits.is_empty());
    }

    #[tokio::test]
    async fn test_binary_file_fails_with_message() {
        let f = fixture(20).await;
        let file = add_file(&f, "blob.bin", &[0u8, 159, 146, 150, 0, 1, 2], &ProcessOptions::default()).await;

        assert_eq!(f.pipeline.run(&f.kb, &file).await, Some(FileStatus::ProcessFailed));

        let row = f.db.get_indexed_file(&file.id).await.unwrap().unwrap();
        assert_eq!(row.get_status().unwrap(), FileStatus::ProcessFailed);
        assert!(!row.error_message.unwrap_or_default().is_empty());
        assert!(!f.engine.has_collection("docs").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_source_file_fails() {
        let f = fixture(20).await;
        let file = IndexedFile::new(
            f.kb.id.clone(),
            "missing-source".to_string(),
            "ghost.txt".to_string(),
            &ProcessOptions::default(),
        );
        let mut scope = f.db.begin().await.unwrap();
        scope.insert_indexed_files(std::slice::from_ref(&file)).await.unwrap();
        scope.commit().await.unwrap();

        assert_eq!(f.pipeline.run(&f.kb, &file).await, Some(FileStatus::ProcessFailed));
        let row = f.db.get_indexed_file(&file.id).await.unwrap().unwrap();
        assert!(row.error_message.unwrap().contains("missing-source"));
    }

    #[tokio::test]
    async fn test_deleted_row_is_skipped_without_indexing() {
        let f = fixture(20).await;
        let file = add_file(&f, "a.txt", b"alpha beta gamma", &ProcessOptions::default()).await;

        f.db.delete_indexed_files(&f.kb.id, std::slice::from_ref(&file.id))
            .await
            .unwrap();

        assert_eq!(f.pipeline.run(&f.kb, &file).await, None);
        assert!(!f.engine.has_collection("docs").await.unwrap());
        assert!(f.db.get_indexed_file(&file.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_model_fails_after_chunk_count() {
        let mut f = fixture(20).await;
        f.kb.embedding_model = "other".to_string();
        let file = add_file(&f, "a.txt", b"alpha beta gamma", &ProcessOptions::default()).await;

        assert_eq!(f.pipeline.run(&f.kb, &file).await, Some(FileStatus::ProcessFailed));
        let row = f.db.get_indexed_file(&file.id).await.unwrap().unwrap();
        assert_eq!(row.chunk_count, Some(1));
        assert!(row.error_message.unwrap().contains("other"));
    }
}
