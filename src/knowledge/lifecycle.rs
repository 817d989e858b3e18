//! Create, rename, delete and populate knowledge bases

use super::{page_offset, KnowledgeService, Paged};
use crate::chunk::ProcessOptions;
use crate::config::ModelKind;
use crate::error::{Error, Result};
use crate::lineage::EdgeKind;
use crate::meta::{CommitEvent, IndexedFile, KnowledgeBase, KnowledgeBaseType};
use crate::store::SegmentFilter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest accepted knowledge-base name
pub const MAX_NAME_LEN: usize = 255;

/// Longest accepted description
pub const MAX_DESCRIPTION_LEN: usize = 512;

/// Parameters for a new knowledge base
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewKnowledgeBase {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub kb_type: KnowledgeBaseType,
    pub embedding_model: String,
    pub chat_model: Option<String>,
}

/// Fields to change; `None` leaves a field as it is
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBaseUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// A source file to admit to a knowledge base
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub source_file_id: String,
    pub file_name: String,
}

/// Names double as vector collection identifiers: an ASCII letter, then
/// letters, digits or underscores.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "name must be 1 to {} characters",
            MAX_NAME_LEN
        )));
    }

    let mut chars = name.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    if !starts_with_letter || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::Validation(format!(
            "invalid name '{}': must start with a letter and contain only letters, digits and '_'",
            name
        )));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<()> {
    match description {
        Some(d) if d.chars().count() > MAX_DESCRIPTION_LEN => Err(Error::Validation(format!(
            "description exceeds {} characters",
            MAX_DESCRIPTION_LEN
        ))),
        _ => Ok(()),
    }
}

impl KnowledgeService {
    /// Persist a new knowledge base. Its collection is created on first ingest.
    pub async fn create(&self, request: NewKnowledgeBase) -> Result<KnowledgeBase> {
        validate_name(&request.name)?;
        validate_description(request.description.as_deref())?;

        if request.embedding_model.trim().is_empty() {
            return Err(Error::Validation("embedding model is required".to_string()));
        }
        if !self
            .models
            .has_model(&request.embedding_model, ModelKind::Embedding)
        {
            return Err(Error::ModelNotFound(request.embedding_model));
        }
        if let Some(chat) = &request.chat_model {
            if !self.models.has_model(chat, ModelKind::Chat) {
                return Err(Error::ModelNotFound(chat.clone()));
            }
        }

        if self
            .db
            .get_knowledge_base_by_name(&request.name)
            .await?
            .is_some()
        {
            return Err(Error::Validation(format!(
                "knowledge base '{}' already exists",
                request.name
            )));
        }

        let kb = KnowledgeBase::new(
            request.name,
            request.description,
            request.kb_type,
            request.embedding_model,
            request.chat_model,
        );
        self.db.insert_knowledge_base(&kb).await?;
        info!("Created knowledge base {} ({})", kb.name, kb.id);
        Ok(kb)
    }

    /// Change name and/or description.
    ///
    /// A new name is applied to the vector collection first; the record is
    /// only updated once the collection answers to the new name.
    pub async fn update(&self, id: &str, update: KnowledgeBaseUpdate) -> Result<KnowledgeBase> {
        let kb = self.require(id).await?;

        let description = match update.description {
            Some(d) => Some(d),
            None => kb.description.clone(),
        };
        validate_description(description.as_deref())?;

        let new_name = update.name.unwrap_or_else(|| kb.name.clone());
        let renaming = new_name != kb.name;
        let mut collection_renamed = false;

        if renaming {
            validate_name(&new_name)?;
            if self.db.get_knowledge_base_by_name(&new_name).await?.is_some() {
                return Err(Error::Validation(format!(
                    "knowledge base '{}' already exists",
                    new_name
                )));
            }
            if self.engine.has_collection(&kb.name).await? {
                self.engine.rename_collection(&kb.name, &new_name).await?;
                collection_renamed = true;
            }
        }

        if let Err(e) = self
            .db
            .update_knowledge_base(&kb.id, &new_name, description.as_deref())
            .await
        {
            if collection_renamed {
                if let Err(undo) = self.engine.rename_collection(&new_name, &kb.name).await {
                    warn!(
                        "Collection {} could not be renamed back to {}: {}",
                        new_name, kb.name, undo
                    );
                }
            }
            return Err(e);
        }

        if renaming {
            info!("Renamed knowledge base {} to {}", kb.name, new_name);
        }
        self.require(&kb.id).await
    }

    /// Rename only
    pub async fn rename(&self, id: &str, new_name: &str) -> Result<KnowledgeBase> {
        self.update(
            id,
            KnowledgeBaseUpdate {
                name: Some(new_name.to_string()),
                description: None,
            },
        )
        .await
    }

    /// Remove the record and its files, then drop the collection
    pub async fn delete(&self, id: &str) -> Result<()> {
        let kb = self.require(id).await?;

        let mut scope = self.db.begin().await?;
        let files = scope.delete_knowledge_base(&kb.id).await?;
        scope.commit().await?;

        match self.engine.drop_collection(&kb.name).await {
            Ok(true) => debug!("Dropped collection {}", kb.name),
            Ok(false) => debug!("Knowledge base {} had no collection", kb.name),
            Err(e) => warn!("Collection {} could not be dropped: {}", kb.name, e),
        }

        info!("Deleted knowledge base {} ({} files)", kb.name, files);
        Ok(())
    }

    /// Admit files as UNPROCESSED and trigger ingestion once committed.
    ///
    /// `options` applies to every file in the batch; `None` uses the
    /// configured defaults.
    pub async fn add_files(
        &self,
        knowledge_base_id: &str,
        files: Vec<FileRef>,
        options: Option<ProcessOptions>,
    ) -> Result<Vec<IndexedFile>> {
        let kb = self.require(knowledge_base_id).await?;
        let options = options.unwrap_or_else(|| self.default_options.clone());
        options.validate()?;

        if files.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<IndexedFile> = files
            .into_iter()
            .map(|f| IndexedFile::new(kb.id.clone(), f.source_file_id, f.file_name, &options))
            .collect();

        let mut scope = self.db.begin().await?;
        scope.on_commit(Arc::new(self.dispatcher.clone()));
        scope.insert_indexed_files(&rows).await?;
        scope.publish(CommitEvent::FilesAdded {
            knowledge_base_id: kb.id.clone(),
            indexed_file_ids: rows.iter().map(|f| f.id.clone()).collect(),
        });
        scope.commit().await?;
        info!("Added {} files to {}", rows.len(), kb.name);

        self.record_lineage(&kb, &rows).await;
        Ok(rows)
    }

    /// One edge per distinct source dataset; failures are logged only
    async fn record_lineage(&self, kb: &KnowledgeBase, rows: &[IndexedFile]) {
        let mut datasets = BTreeSet::new();
        for row in rows {
            match self.files.resolve(&row.source_file_id).await {
                Ok(resolved) => {
                    datasets.insert(resolved.dataset_id);
                }
                Err(e) => debug!("No dataset for {}: {}", row.source_file_id, e),
            }
        }

        for dataset_id in datasets {
            if let Err(e) = self
                .lineage
                .record_edge(&dataset_id, EdgeKind::DatasetToKnowledgeBase, &kb.id)
                .await
            {
                warn!(
                    "Lineage edge {} -> {} not recorded: {}",
                    dataset_id, kb.name, e
                );
            }
        }
    }

    /// Remove files and their segments. Returns the number of rows removed.
    pub async fn delete_files(&self, knowledge_base_id: &str, file_ids: &[String]) -> Result<u64> {
        let kb = self.require(knowledge_base_id).await?;
        if file_ids.is_empty() {
            return Ok(0);
        }

        let removed = self.db.delete_indexed_files(&kb.id, file_ids).await?;
        if self.engine.has_collection(&kb.name).await? {
            self.engine
                .delete(&kb.name, &SegmentFilter::files(file_ids.to_vec()))
                .await?;
        }

        info!("Deleted {} files from {}", removed, kb.name);
        Ok(removed)
    }

    /// Page through a knowledge base's files
    pub async fn list_files(
        &self,
        knowledge_base_id: &str,
        page: u64,
        size: u64,
    ) -> Result<Paged<IndexedFile>> {
        let offset = page_offset(page, size)?;
        let kb = self.require(knowledge_base_id).await?;

        let items = self
            .db
            .list_indexed_files(&kb.id, size as i64, offset as i64)
            .await?;
        let total = self.db.count_indexed_files(&kb.id).await?;
        Ok(Paged::new(items, page, size, total as u64))
    }

    /// Re-run ingestion for every file not yet PROCESSED
    pub async fn retrigger(&self, knowledge_base_id: &str) -> Result<()> {
        let kb = self.require(knowledge_base_id).await?;
        info!("Retriggering ingestion for {}", kb.name);
        self.dispatcher.trigger(&kb.id);
        Ok(())
    }
}
