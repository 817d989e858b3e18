//! Source file resolution
//!
//! Knowledge bases reference dataset files by id. The pipeline resolves those
//! ids to a readable path and a detected type through [`FileResolver`]; the
//! local implementation reads the `dataset_files` catalog.

use crate::error::{Error, Result};
use crate::meta::{DatasetFile, MetaDb};
use crate::parse::file_type_of;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// A source file ready to be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub path: PathBuf,
    /// Lowercase extension, empty when unknown
    pub file_type: String,
    pub dataset_id: String,
}

/// Resolves a source file reference to its location and type
#[async_trait]
pub trait FileResolver: Send + Sync {
    /// Fails with `FileNotFound` when the id is unknown
    async fn resolve(&self, source_file_id: &str) -> Result<ResolvedFile>;
}

/// Resolver over the local dataset file catalog
#[derive(Clone)]
pub struct DatasetFileResolver {
    db: MetaDb,
}

impl DatasetFileResolver {
    pub fn new(db: MetaDb) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FileResolver for DatasetFileResolver {
    async fn resolve(&self, source_file_id: &str) -> Result<ResolvedFile> {
        let file = self
            .db
            .get_dataset_file(source_file_id)
            .await?
            .ok_or_else(|| Error::FileNotFound(source_file_id.to_string()))?;

        Ok(ResolvedFile {
            path: PathBuf::from(file.file_path),
            file_type: file.file_type,
            dataset_id: file.dataset_id,
        })
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Add a file, or every regular file below a directory, to a dataset
pub async fn register_path(db: &MetaDb, dataset_id: &str, path: &Path) -> Result<Vec<DatasetFile>> {
    let root = std::fs::canonicalize(path)
        .map_err(|_| Error::FileNotFound(path.display().to_string()))?;

    let mut paths = Vec::new();
    if root.is_dir() {
        for entry in WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
        {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if entry.file_type().is_file() {
                paths.push(entry.into_path());
            }
        }
    } else {
        paths.push(root);
    }

    let mut registered = Vec::with_capacity(paths.len());
    for file_path in paths {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let file = DatasetFile::new(
            dataset_id.to_string(),
            file_name,
            file_path.to_string_lossy().to_string(),
            file_type_of(&file_path).unwrap_or_default(),
        );
        debug!("Registering {} in dataset {}", file.file_path, dataset_id);
        db.insert_dataset_file(&file).await?;
        registered.push(file);
    }

    info!("Registered {} files in dataset {}", registered.len(), dataset_id);
    Ok(registered)
}
