//! Provenance recording between datasets and knowledge bases

use crate::error::Result;
use crate::meta::MetaDb;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Kind of provenance relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// A dataset's files feed a knowledge base
    DatasetToKnowledgeBase,
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeKind::DatasetToKnowledgeBase => write!(f, "dataset_to_knowledge_base"),
        }
    }
}

/// Records provenance edges. Callers treat failures as non-fatal.
#[async_trait]
pub trait LineageRecorder: Send + Sync {
    async fn record_edge(&self, from_id: &str, kind: EdgeKind, to_id: &str) -> Result<()>;
}

/// Lineage recorder writing to the metadata database
#[derive(Clone)]
pub struct SqliteLineageRecorder {
    db: MetaDb,
}

impl SqliteLineageRecorder {
    pub fn new(db: MetaDb) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LineageRecorder for SqliteLineageRecorder {
    async fn record_edge(&self, from_id: &str, kind: EdgeKind, to_id: &str) -> Result<()> {
        debug!("Recording lineage {} -[{}]-> {}", from_id, kind, to_id);
        self.db
            .insert_lineage_edge(from_id, &kind.to_string(), to_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_edges_are_idempotent() {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("meta.db")).await.unwrap();
        let recorder = SqliteLineageRecorder::new(db.clone());

        recorder.record_edge("ds1", EdgeKind::DatasetToKnowledgeBase, "kb").await.unwrap();
        recorder.record_edge("ds1", EdgeKind::DatasetToKnowledgeBase, "kb").await.unwrap();
        recorder.record_edge("ds2", EdgeKind::DatasetToKnowledgeBase, "kb").await.unwrap();

        let edges = db.list_lineage_edges("kb").await.unwrap();
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.edge_type == "dataset_to_knowledge_base"));
    }
}
