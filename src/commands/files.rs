//! File registration and knowledge-base file commands

use crate::chunk::ProcessOptions;
use crate::error::{Error, Result};
use crate::knowledge::{FileRef, KnowledgeService, Paged};
use crate::meta::{DatasetFile, FileStatus, IndexedFile, KnowledgeBaseType, MetaDb};
use crate::progress::{ingestion_bar, track_files};
use crate::sources::register_path;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// What to add and how to chunk it
#[derive(Debug, Clone, Default)]
pub struct AddFilesOptions {
    /// Dataset file ids to add
    pub source_ids: Vec<String>,
    /// Add every file registered under these datasets
    pub datasets: Vec<String>,
    /// `None` applies the configured `[chunk]` defaults
    pub process: Option<ProcessOptions>,
    /// Draw a progress bar while waiting
    pub show_progress: bool,
}

/// Outcome of an add, with statuses as of return
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddFilesReport {
    pub knowledge_base: String,
    pub files: Vec<IndexedFile>,
    pub processed: usize,
    pub failed: usize,
    pub pending: usize,
}

/// Register a file or directory tree as dataset files
pub async fn cmd_files_register(db: &MetaDb, dataset_id: &str, path: &Path) -> Result<Vec<DatasetFile>> {
    if dataset_id.trim().is_empty() {
        return Err(Error::Validation("dataset id must not be empty".to_string()));
    }
    let files = register_path(db, dataset_id, path).await?;
    info!("Registered {} files in dataset {}", files.len(), dataset_id);
    Ok(files)
}

async fn collect_refs(db: &MetaDb, options: &AddFilesOptions) -> Result<Vec<FileRef>> {
    let mut refs = Vec::new();
    for id in &options.source_ids {
        let file = db
            .get_dataset_file(id)
            .await?
            .ok_or_else(|| Error::FileNotFound(id.clone()))?;
        refs.push(FileRef {
            source_file_id: file.id,
            file_name: file.file_name,
        });
    }
    for dataset in &options.datasets {
        let files = db.list_dataset_files(Some(dataset)).await?;
        if files.is_empty() {
            warn!("Dataset {} has no registered files", dataset);
        }
        refs.extend(files.into_iter().map(|f| FileRef {
            source_file_id: f.id,
            file_name: f.file_name,
        }));
    }
    Ok(refs)
}

/// Add files to a knowledge base, optionally waiting for ingestion
pub async fn cmd_files_add(
    service: &KnowledgeService,
    kb: &str,
    options: AddFilesOptions,
) -> Result<AddFilesReport> {
    let kb = service.resolve(kb).await?;
    let refs = collect_refs(service.db(), &options).await?;
    if refs.is_empty() {
        return Err(Error::Validation("no files to add".to_string()));
    }

    let added = service
        .add_files(&kb.id, refs, options.process.clone())
        .await?;

    // GRAPH files are indexed remotely and never turn terminal here
    let track = options.show_progress && kb.get_type()? == KnowledgeBaseType::Document;
    let bar = track.then(|| ingestion_bar(added.len() as u64));
    let tracker = bar.clone().map(|bar| {
        let ids = added.iter().map(|f| f.id.clone()).collect();
        tokio::spawn(track_files(service.db().clone(), ids, bar))
    });

    wait_for_ingestion(service).await;

    if let Some(tracker) = tracker {
        tracker.abort();
    }
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let ids: Vec<String> = added.iter().map(|f| f.id.clone()).collect();
    let files = service.db().get_indexed_files(&kb.id, &ids).await?;
    Ok(report(kb.name, files))
}

/// Block until ingestion settles. The pipeline lives in this process, so
/// returning early would abort it. Ctrl-C stops admission instead: running
/// files finish and queued ones stay UNPROCESSED.
async fn wait_for_ingestion(service: &KnowledgeService) {
    let scheduler = service.dispatcher().scheduler().clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted: finishing running files; queued files stay pending until 'ragindex files retry'");
            scheduler.close();
        }
    });

    service.wait_idle().await;
    interrupt.abort();
}

fn report(knowledge_base: String, files: Vec<IndexedFile>) -> AddFilesReport {
    let mut processed = 0;
    let mut failed = 0;
    let mut pending = 0;
    for file in &files {
        match file.get_status() {
            Ok(FileStatus::Processed) => processed += 1,
            Ok(FileStatus::ProcessFailed) => failed += 1,
            _ => pending += 1,
        }
    }
    AddFilesReport {
        knowledge_base,
        files,
        processed,
        failed,
        pending,
    }
}

pub async fn cmd_files_list(
    service: &KnowledgeService,
    kb: &str,
    page: u64,
    size: u64,
) -> Result<Paged<IndexedFile>> {
    let kb = service.resolve(kb).await?;
    service.list_files(&kb.id, page, size).await
}

/// Delete files from a knowledge base; returns the number removed
pub async fn cmd_files_delete(service: &KnowledgeService, kb: &str, file_ids: &[String]) -> Result<u64> {
    let kb = service.resolve(kb).await?;
    service.delete_files(&kb.id, file_ids).await
}

/// Re-run ingestion for unprocessed and failed files
pub async fn cmd_files_retry(service: &KnowledgeService, kb: &str) -> Result<AddFilesReport> {
    let kb = service.resolve(kb).await?;
    let pending = service.db().list_pending_files(&kb.id).await?;
    service.retrigger(&kb.id).await?;
    wait_for_ingestion(service).await;

    let ids: Vec<String> = pending.iter().map(|f| f.id.clone()).collect();
    let files = service.db().get_indexed_files(&kb.id, &ids).await?;
    Ok(report(kb.name, files))
}

pub fn print_registered(files: &[DatasetFile]) {
    if files.is_empty() {
        println!("No files registered.");
        return;
    }
    println!("✓ Registered {} files\n", files.len());
    for file in files {
        println!("  {}  {} [{}]", file.id, file.file_path, file.file_type);
    }
}

fn print_file(file: &IndexedFile) {
    let chunks = file
        .chunk_count
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("• {} [{}] chunks: {}", file.file_name, file.status, chunks);
    println!("  ID: {}", file.id);
    if let Some(error) = &file.error_message {
        println!("  Error: {}", error);
    }
}

pub fn print_add_report(report: &AddFilesReport) {
    println!("\n✓ Files added to {}", report.knowledge_base);
    println!("  Processed: {}", report.processed);
    println!("  Failed: {}", report.failed);
    println!("  Pending: {}", report.pending);

    let failures: Vec<&IndexedFile> = report
        .files
        .iter()
        .filter(|f| f.error_message.is_some())
        .collect();
    if !failures.is_empty() {
        println!();
        for file in failures {
            print_file(file);
        }
    }
}

pub fn print_files(page: &Paged<IndexedFile>) {
    if page.items.is_empty() {
        println!("No files.");
        return;
    }
    for file in &page.items {
        print_file(file);
    }
    println!(
        "\nPage {}/{} ({} total)",
        page.page,
        page.total_pages.max(1),
        page.total
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(status: FileStatus) -> IndexedFile {
        let mut file = IndexedFile::new("kb".into(), "src".into(), "a.txt".into(), &ProcessOptions::default());
        file.status = status.to_string();
        file
    }

    #[test]
    fn test_report_tallies_statuses() {
        let files = vec![
            file(FileStatus::Processed),
            file(FileStatus::ProcessFailed),
            file(FileStatus::Processing),
            file(FileStatus::Unprocessed),
        ];
        let report = report("docs".into(), files);
        assert_eq!((report.processed, report.failed, report.pending), (1, 1, 2));
    }
}
