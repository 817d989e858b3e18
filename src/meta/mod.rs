//! Metadata storage using SQLite
//!
//! This module handles all local metadata storage including:
//! - Knowledge bases (name, type, model references)
//! - Indexed files (per-file processing status)
//! - Dataset files (catalog used to resolve source file references)
//! - Lineage edges (dataset to knowledge base provenance)
//!
//! Writes that must be observed by background ingestion go through a
//! [`CommitScope`], which only releases its events once the transaction has
//! committed.

mod schema;

pub use schema::*;

use crate::chunk::ProcessOptions;
use crate::config::Config;
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Knowledge base indexing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KnowledgeBaseType {
    #[default]
    Document,
    /// Indexed by the external graph service instead of the segment pipeline
    Graph,
}

impl std::fmt::Display for KnowledgeBaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KnowledgeBaseType::Document => write!(f, "DOCUMENT"),
            KnowledgeBaseType::Graph => write!(f, "GRAPH"),
        }
    }
}

impl FromStr for KnowledgeBaseType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "DOCUMENT" => Ok(KnowledgeBaseType::Document),
            "GRAPH" => Ok(KnowledgeBaseType::Graph),
            _ => Err(Error::Validation(format!("Unknown knowledge base type: {}", s))),
        }
    }
}

/// Indexed file processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    Unprocessed,
    Processing,
    Processed,
    ProcessFailed,
}

impl FileStatus {
    /// Terminal states end a pipeline run
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Processed | FileStatus::ProcessFailed)
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Unprocessed => write!(f, "UNPROCESSED"),
            FileStatus::Processing => write!(f, "PROCESSING"),
            FileStatus::Processed => write!(f, "PROCESSED"),
            FileStatus::ProcessFailed => write!(f, "PROCESS_FAILED"),
        }
    }
}

impl FromStr for FileStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "UNPROCESSED" => Ok(FileStatus::Unprocessed),
            "PROCESSING" => Ok(FileStatus::Processing),
            "PROCESSED" => Ok(FileStatus::Processed),
            "PROCESS_FAILED" => Ok(FileStatus::ProcessFailed),
            _ => Err(Error::Validation(format!("Unknown file status: {}", s))),
        }
    }
}

/// A knowledge base record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub kb_type: String,
    pub embedding_model: String,
    pub chat_model: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl KnowledgeBase {
    pub fn new(
        name: String,
        description: Option<String>,
        kb_type: KnowledgeBaseType,
        embedding_model: String,
        chat_model: Option<String>,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            description,
            kb_type: kb_type.to_string(),
            embedding_model,
            chat_model,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn get_type(&self) -> Result<KnowledgeBaseType> {
        self.kb_type.parse()
    }
}

/// A file admitted to a knowledge base
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IndexedFile {
    pub id: String,
    pub knowledge_base_id: String,
    pub source_file_id: String,
    pub file_name: String,
    pub status: String,
    pub chunk_count: Option<i64>,
    pub error_message: Option<String>,
    /// Chunking options as JSON, fixed when the file is added
    pub process_options: String,
    pub created_at: String,
    pub updated_at: String,
}

impl IndexedFile {
    pub fn new(
        knowledge_base_id: String,
        source_file_id: String,
        file_name: String,
        options: &ProcessOptions,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            knowledge_base_id,
            source_file_id,
            file_name,
            status: FileStatus::Unprocessed.to_string(),
            chunk_count: None,
            error_message: None,
            process_options: serde_json::to_string(options).unwrap_or_default(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn get_status(&self) -> Result<FileStatus> {
        self.status.parse()
    }

    pub fn options(&self) -> Result<ProcessOptions> {
        Ok(serde_json::from_str(&self.process_options)?)
    }
}

/// A file stored in a dataset
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DatasetFile {
    pub id: String,
    pub dataset_id: String,
    pub file_name: String,
    pub file_path: String,
    pub file_type: String,
    pub created_at: String,
}

impl DatasetFile {
    pub fn new(dataset_id: String, file_name: String, file_path: String, file_type: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            dataset_id,
            file_name,
            file_path,
            file_type,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A provenance edge
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LineageEdge {
    pub from_id: String,
    pub edge_type: String,
    pub to_id: String,
    pub created_at: String,
}

/// Relational aggregates for one knowledge base
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBaseStats {
    pub file_count: i64,
    pub chunk_count: i64,
}

/// Global statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalStats {
    pub knowledge_base_count: i64,
    pub file_count: i64,
    pub unprocessed: i64,
    pub processing: i64,
    pub processed: i64,
    pub process_failed: i64,
    pub chunk_count: i64,
    pub dataset_file_count: i64,
}

/// Events released after a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitEvent {
    /// Files were admitted to a knowledge base and await ingestion
    FilesAdded {
        knowledge_base_id: String,
        indexed_file_ids: Vec<String>,
    },
}

/// Receives events from committed transactions
pub trait CommitListener: Send + Sync {
    fn committed(&self, event: &CommitEvent);
}

/// A write transaction with buffered commit-phase events.
///
/// Dropping the scope without calling [`CommitScope::commit`] rolls the
/// transaction back and discards the events.
pub struct CommitScope {
    tx: Transaction<'static, Sqlite>,
    events: Vec<CommitEvent>,
    listeners: Vec<Arc<dyn CommitListener>>,
}

impl CommitScope {
    /// Register a listener for this scope's events
    pub fn on_commit(&mut self, listener: Arc<dyn CommitListener>) {
        self.listeners.push(listener);
    }

    /// Buffer an event until commit
    pub fn publish(&mut self, event: CommitEvent) {
        self.events.push(event);
    }

    /// Insert indexed file rows as one batch
    pub async fn insert_indexed_files(&mut self, files: &[IndexedFile]) -> Result<()> {
        for file in files {
            sqlx::query(
                r#"
                INSERT INTO indexed_files (id, knowledge_base_id, source_file_id, file_name, status, chunk_count, error_message, process_options, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&file.id)
            .bind(&file.knowledge_base_id)
            .bind(&file.source_file_id)
            .bind(&file.file_name)
            .bind(&file.status)
            .bind(file.chunk_count)
            .bind(&file.error_message)
            .bind(&file.process_options)
            .bind(&file.created_at)
            .bind(&file.updated_at)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    /// Delete a knowledge base and every file row that references it
    pub async fn delete_knowledge_base(&mut self, id: &str) -> Result<u64> {
        let files = sqlx::query("DELETE FROM indexed_files WHERE knowledge_base_id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM knowledge_bases WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(files)
    }

    /// Commit, then hand every buffered event to the registered listeners
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        for event in &self.events {
            for listener in &self.listeners {
                listener.committed(event);
            }
        }
        Ok(())
    }
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the metadata database
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file).await
    }

    /// Create database with path directly, initializing the schema if needed
    pub async fn new(db_path: &Path) -> Result<Self> {
        let db = Self::open(db_path).await?;
        if !db.is_initialized().await? {
            db.init_schema().await?;
        }
        Ok(db)
    }

    async fn open(db_path: &Path) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='knowledge_bases'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    /// Open a write transaction
    pub async fn begin(&self) -> Result<CommitScope> {
        Ok(CommitScope {
            tx: self.pool.begin().await?,
            events: Vec::new(),
            listeners: Vec::new(),
        })
    }

    // ===== Knowledge Base Operations =====

    /// Insert a new knowledge base
    pub async fn insert_knowledge_base(&self, kb: &KnowledgeBase) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO knowledge_bases (id, name, description, kb_type, embedding_model, chat_model, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&kb.id)
        .bind(&kb.name)
        .bind(&kb.description)
        .bind(&kb.kb_type)
        .bind(&kb.embedding_model)
        .bind(&kb.chat_model)
        .bind(&kb.created_at)
        .bind(&kb.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get knowledge base by ID
    pub async fn get_knowledge_base(&self, id: &str) -> Result<Option<KnowledgeBase>> {
        let kb = sqlx::query_as::<_, KnowledgeBase>("SELECT * FROM knowledge_bases WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(kb)
    }

    /// Get knowledge base by name (case-sensitive match)
    pub async fn get_knowledge_base_by_name(&self, name: &str) -> Result<Option<KnowledgeBase>> {
        let kb =
            sqlx::query_as::<_, KnowledgeBase>("SELECT * FROM knowledge_bases WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(kb)
    }

    /// Page through knowledge bases, newest first
    pub async fn list_knowledge_bases_page(&self, limit: i64, offset: i64) -> Result<Vec<KnowledgeBase>> {
        let kbs = sqlx::query_as::<_, KnowledgeBase>(
            "SELECT * FROM knowledge_bases ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(kbs)
    }

    pub async fn count_knowledge_bases(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_bases")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Update name and description
    pub async fn update_knowledge_base(
        &self,
        id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE knowledge_bases SET name = ?, description = ?, updated_at = ? WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// File and chunk totals from the relational store
    pub async fn knowledge_base_stats(&self, id: &str) -> Result<KnowledgeBaseStats> {
        let (file_count, chunk_count): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(chunk_count), 0) FROM indexed_files WHERE knowledge_base_id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(KnowledgeBaseStats {
            file_count,
            chunk_count,
        })
    }

    // ===== Indexed File Operations =====

    /// Get indexed file by ID
    pub async fn get_indexed_file(&self, id: &str) -> Result<Option<IndexedFile>> {
        let file = sqlx::query_as::<_, IndexedFile>("SELECT * FROM indexed_files WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(file)
    }

    /// Page through a knowledge base's files
    pub async fn list_indexed_files(
        &self,
        knowledge_base_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<IndexedFile>> {
        let files = sqlx::query_as::<_, IndexedFile>(
            "SELECT * FROM indexed_files WHERE knowledge_base_id = ? ORDER BY created_at, id LIMIT ? OFFSET ?",
        )
        .bind(knowledge_base_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(files)
    }

    /// Count a knowledge base's files
    pub async fn count_indexed_files(&self, knowledge_base_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM indexed_files WHERE knowledge_base_id = ?")
                .bind(knowledge_base_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Files not yet PROCESSED
    pub async fn list_pending_files(&self, knowledge_base_id: &str) -> Result<Vec<IndexedFile>> {
        let files = sqlx::query_as::<_, IndexedFile>(
            "SELECT * FROM indexed_files WHERE knowledge_base_id = ? AND status != ? ORDER BY created_at, id",
        )
        .bind(knowledge_base_id)
        .bind(FileStatus::Processed.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(files)
    }

    /// Files of a knowledge base restricted to the given ids
    pub async fn get_indexed_files(
        &self,
        knowledge_base_id: &str,
        ids: &[String],
    ) -> Result<Vec<IndexedFile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "SELECT * FROM indexed_files WHERE knowledge_base_id = ? AND id IN ({}) ORDER BY created_at, id",
            placeholders
        );

        let mut query_builder = sqlx::query_as::<_, IndexedFile>(&query).bind(knowledge_base_id);
        for id in ids {
            query_builder = query_builder.bind(id);
        }
        Ok(query_builder.fetch_all(&self.pool).await?)
    }

    /// Mark a file as being processed, clearing any previous error.
    /// Returns false when the row no longer exists.
    pub async fn mark_processing(&self, id: &str) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE indexed_files SET status = ?, error_message = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(FileStatus::Processing.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    /// Record the number of segments produced for a file
    pub async fn set_chunk_count(&self, id: &str, chunk_count: i64) -> Result<()> {
        sqlx::query("UPDATE indexed_files SET chunk_count = ?, updated_at = ? WHERE id = ?")
            .bind(chunk_count)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_processed(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE indexed_files SET status = ?, updated_at = ? WHERE id = ?")
            .bind(FileStatus::Processed.to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: &str, error_message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE indexed_files SET status = ?, error_message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(FileStatus::ProcessFailed.to_string())
        .bind(error_message)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete file rows of a knowledge base, returning how many were removed
    pub async fn delete_indexed_files(&self, knowledge_base_id: &str, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "DELETE FROM indexed_files WHERE knowledge_base_id = ? AND id IN ({})",
            placeholders
        );

        let mut query_builder = sqlx::query(&query).bind(knowledge_base_id);
        for id in ids {
            query_builder = query_builder.bind(id);
        }
        Ok(query_builder.execute(&self.pool).await?.rows_affected())
    }

    // ===== Dataset File Operations =====

    /// Register a dataset file
    pub async fn insert_dataset_file(&self, file: &DatasetFile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dataset_files (id, dataset_id, file_name, file_path, file_type, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&file.id)
        .bind(&file.dataset_id)
        .bind(&file.file_name)
        .bind(&file.file_path)
        .bind(&file.file_type)
        .bind(&file.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get dataset file by ID
    pub async fn get_dataset_file(&self, id: &str) -> Result<Option<DatasetFile>> {
        let file = sqlx::query_as::<_, DatasetFile>("SELECT * FROM dataset_files WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(file)
    }

    /// List dataset files, optionally for a single dataset
    pub async fn list_dataset_files(&self, dataset_id: Option<&str>) -> Result<Vec<DatasetFile>> {
        let files = match dataset_id {
            Some(dataset_id) => {
                sqlx::query_as::<_, DatasetFile>(
                    "SELECT * FROM dataset_files WHERE dataset_id = ? ORDER BY file_name",
                )
                .bind(dataset_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, DatasetFile>(
                    "SELECT * FROM dataset_files ORDER BY dataset_id, file_name",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(files)
    }

    // ===== Lineage Operations =====

    /// Record an edge; repeated edges are ignored
    pub async fn insert_lineage_edge(&self, from_id: &str, edge_type: &str, to_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO lineage_edges (from_id, edge_type, to_id, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(from_id)
        .bind(edge_type)
        .bind(to_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Edges pointing at an entity
    pub async fn list_lineage_edges(&self, to_id: &str) -> Result<Vec<LineageEdge>> {
        let edges = sqlx::query_as::<_, LineageEdge>(
            "SELECT * FROM lineage_edges WHERE to_id = ? ORDER BY created_at, from_id",
        )
        .bind(to_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(edges)
    }

    // ===== Statistics =====

    /// Get global statistics
    pub async fn get_global_stats(&self) -> Result<GlobalStats> {
        let knowledge_base_count = self.count_knowledge_bases().await?;

        let dataset_file_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dataset_files")
            .fetch_one(&self.pool)
            .await?;

        let chunk_count: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(chunk_count), 0) FROM indexed_files")
                .fetch_one(&self.pool)
                .await?;

        let by_status: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM indexed_files GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = GlobalStats {
            knowledge_base_count,
            dataset_file_count,
            chunk_count,
            ..Default::default()
        };
        for (status, count) in by_status {
            stats.file_count += count;
            match status.parse::<FileStatus>() {
                Ok(FileStatus::Unprocessed) => stats.unprocessed += count,
                Ok(FileStatus::Processing) => stats.processing += count,
                Ok(FileStatus::Processed) => stats.processed += count,
                Ok(FileStatus::ProcessFailed) => stats.process_failed += count,
                Err(_) => {}
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    async fn setup_test_db() -> (MetaDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");

        let db = MetaDb::connect(&config).await.unwrap();
        db.init_schema().await.unwrap();
        (db, tmp)
    }

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<CommitEvent>>,
    }

    impl CommitListener for RecordingListener {
        fn committed(&self, event: &CommitEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn sample_kb(name: &str) -> KnowledgeBase {
        KnowledgeBase::new(
            name.to_string(),
            None,
            KnowledgeBaseType::Document,
            "default-embedding".to_string(),
            None,
        )
    }

    async fn add_files(db: &MetaDb, kb_id: &str, names: &[&str]) -> Vec<IndexedFile> {
        let files: Vec<IndexedFile> = names
            .iter()
            .map(|n| {
                IndexedFile::new(
                    kb_id.to_string(),
                    format!("src-{}", n),
                    n.to_string(),
                    &ProcessOptions::default(),
                )
            })
            .collect();
        let mut scope = db.begin().await.unwrap();
        scope.insert_indexed_files(&files).await.unwrap();
        scope.commit().await.unwrap();
        files
    }

    #[tokio::test]
    async fn test_knowledge_base_crud() {
        let (db, _tmp) = setup_test_db().await;

        let kb = sample_kb("docs");
        db.insert_knowledge_base(&kb).await.unwrap();

        let loaded = db.get_knowledge_base(&kb.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "docs");
        assert_eq!(loaded.get_type().unwrap(), KnowledgeBaseType::Document);

        db.update_knowledge_base(&kb.id, "renamed", Some("about things"))
            .await
            .unwrap();
        let loaded = db.get_knowledge_base_by_name("renamed").await.unwrap().unwrap();
        assert_eq!(loaded.description.as_deref(), Some("about things"));
        assert!(db.get_knowledge_base_by_name("docs").await.unwrap().is_none());

        assert_eq!(db.count_knowledge_bases().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let (db, _tmp) = setup_test_db().await;
        db.insert_knowledge_base(&sample_kb("docs")).await.unwrap();
        assert!(db.insert_knowledge_base(&sample_kb("docs")).await.is_err());
    }

    #[tokio::test]
    async fn test_events_released_only_after_commit() {
        let (db, _tmp) = setup_test_db().await;
        let kb = sample_kb("docs");
        db.insert_knowledge_base(&kb).await.unwrap();

        let listener = Arc::new(RecordingListener::default());
        let file = IndexedFile::new(kb.id.clone(), "s1".into(), "a.txt".into(), &ProcessOptions::default());
        let event = CommitEvent::FilesAdded {
            knowledge_base_id: kb.id.clone(),
            indexed_file_ids: vec![file.id.clone()],
        };

        // Rolled back: no rows, no events
        {
            let mut scope = db.begin().await.unwrap();
            scope.on_commit(listener.clone());
            scope.insert_indexed_files(std::slice::from_ref(&file)).await.unwrap();
            scope.publish(event.clone());
        }
        assert!(listener.events.lock().unwrap().is_empty());
        assert_eq!(db.count_indexed_files(&kb.id).await.unwrap(), 0);

        let mut scope = db.begin().await.unwrap();
        scope.on_commit(listener.clone());
        scope.insert_indexed_files(std::slice::from_ref(&file)).await.unwrap();
        scope.publish(event.clone());
        scope.commit().await.unwrap();

        assert_eq!(*listener.events.lock().unwrap(), vec![event]);
        assert_eq!(db.count_indexed_files(&kb.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_file_status_transitions() {
        let (db, _tmp) = setup_test_db().await;
        let kb = sample_kb("docs");
        db.insert_knowledge_base(&kb).await.unwrap();
        let files = add_files(&db, &kb.id, &["a.txt", "b.txt"]).await;

        assert_eq!(db.list_pending_files(&kb.id).await.unwrap().len(), 2);

        assert!(db.mark_processing(&files[0].id).await.unwrap());
        assert!(!db.mark_processing("gone").await.unwrap());
        db.set_chunk_count(&files[0].id, 4).await.unwrap();
        db.mark_processed(&files[0].id).await.unwrap();

        db.mark_failed(&files[1].id, "boom").await.unwrap();
        let failed = db.get_indexed_file(&files[1].id).await.unwrap().unwrap();
        assert_eq!(failed.get_status().unwrap(), FileStatus::ProcessFailed);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));

        assert!(db.mark_processing(&files[1].id).await.unwrap());
        let retried = db.get_indexed_file(&files[1].id).await.unwrap().unwrap();
        assert_eq!(retried.get_status().unwrap(), FileStatus::Processing);
        assert!(retried.error_message.is_none());

        let pending = db.list_pending_files(&kb.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, files[1].id);

        let stats = db.knowledge_base_stats(&kb.id).await.unwrap();
        assert_eq!(stats, KnowledgeBaseStats { file_count: 2, chunk_count: 4 });

        let global = db.get_global_stats().await.unwrap();
        assert_eq!(global.file_count, 2);
        assert_eq!(global.processed, 1);
        assert_eq!(global.processing, 1);
    }

    #[tokio::test]
    async fn test_process_options_persisted() {
        let (db, _tmp) = setup_test_db().await;
        let kb = sample_kb("docs");
        db.insert_knowledge_base(&kb).await.unwrap();

        let options = ProcessOptions {
            chunk_size: 120,
            overlap_size: 10,
            ..Default::default()
        };
        let file = IndexedFile::new(kb.id.clone(), "s".into(), "a.md".into(), &options);
        let mut scope = db.begin().await.unwrap();
        scope.insert_indexed_files(std::slice::from_ref(&file)).await.unwrap();
        scope.commit().await.unwrap();

        let loaded = db.get_indexed_file(&file.id).await.unwrap().unwrap();
        assert_eq!(loaded.options().unwrap(), options);
    }

    #[tokio::test]
    async fn test_delete_knowledge_base_cascades() {
        let (db, _tmp) = setup_test_db().await;
        let kb = sample_kb("docs");
        let other = sample_kb("other");
        db.insert_knowledge_base(&kb).await.unwrap();
        db.insert_knowledge_base(&other).await.unwrap();
        add_files(&db, &kb.id, &["a", "b", "c"]).await;
        add_files(&db, &other.id, &["d"]).await;

        let mut scope = db.begin().await.unwrap();
        assert_eq!(scope.delete_knowledge_base(&kb.id).await.unwrap(), 3);
        scope.commit().await.unwrap();

        assert!(db.get_knowledge_base(&kb.id).await.unwrap().is_none());
        assert_eq!(db.count_indexed_files(&kb.id).await.unwrap(), 0);
        assert_eq!(db.count_indexed_files(&other.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_and_delete_files() {
        let (db, _tmp) = setup_test_db().await;
        let kb = sample_kb("docs");
        db.insert_knowledge_base(&kb).await.unwrap();
        let files = add_files(&db, &kb.id, &["a", "b", "c"]).await;

        let page = db.list_indexed_files(&kb.id, 2, 2).await.unwrap();
        assert_eq!(page.len(), 1);

        let ids = vec![files[0].id.clone(), "missing".to_string()];
        assert_eq!(db.get_indexed_files(&kb.id, &ids).await.unwrap().len(), 1);
        assert_eq!(db.delete_indexed_files(&kb.id, &ids).await.unwrap(), 1);
        assert_eq!(db.count_indexed_files(&kb.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dataset_files_and_lineage() {
        let (db, _tmp) = setup_test_db().await;

        let file = DatasetFile::new("ds1".into(), "a.txt".into(), "/tmp/a.txt".into(), "txt".into());
        db.insert_dataset_file(&file).await.unwrap();
        assert_eq!(db.get_dataset_file(&file.id).await.unwrap().unwrap().dataset_id, "ds1");
        assert_eq!(db.list_dataset_files(Some("ds1")).await.unwrap().len(), 1);
        assert!(db.list_dataset_files(Some("ds2")).await.unwrap().is_empty());

        db.insert_lineage_edge("ds1", "dataset_to_knowledge_base", "kb1").await.unwrap();
        db.insert_lineage_edge("ds1", "dataset_to_knowledge_base", "kb1").await.unwrap();
        assert_eq!(db.list_lineage_edges("kb1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_new_initializes_schema() {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("nested").join("meta.db")).await.unwrap();
        assert!(db.is_initialized().await.unwrap());
    }
}
