//! Status command implementation

use crate::config::{Config, ModelKind};
use crate::error::Result;
use crate::meta::{GlobalStats, MetaDb};
use crate::store::VectorEngine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// A registered model as shown by status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub id: String,
    pub kind: ModelKind,
    pub model_name: String,
}

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub vector_backend: String,
    pub vector_url: String,
    pub vector_reachable: bool,
    pub max_concurrent_files: usize,
    pub models: Vec<ModelSummary>,
    pub db_stats: GlobalStats,
}

/// Collect configuration, metadata totals and vector engine reachability
pub async fn cmd_status(config: &Config, db: &MetaDb, engine: Arc<dyn VectorEngine>) -> Result<StatusInfo> {
    info!("Getting status");

    let db_stats = db.get_global_stats().await?;

    // Any lookup round-trips to the engine
    let vector_reachable = match engine.has_collection("ragindex_status_probe").await {
        Ok(_) => true,
        Err(e) => {
            debug!("Vector engine unreachable: {}", e);
            false
        }
    };

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        vector_backend: engine.backend().to_string(),
        vector_url: config.vector.qdrant_url.clone(),
        vector_reachable,
        max_concurrent_files: config.ingestion.max_concurrent_files,
        models: config
            .models
            .iter()
            .map(|m| ModelSummary {
                id: m.id.clone(),
                kind: m.kind,
                model_name: m.model_name.clone(),
            })
            .collect(),
        db_stats,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 ragindex Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);

    println!("\nVector engine ({}):", status.vector_backend);
    if status.vector_backend == "qdrant" {
        println!("  URL: {}", status.vector_url);
    }
    let reachability = if status.vector_reachable {
        "✓ Reachable"
    } else {
        "✗ Not reachable"
    };
    println!("  Status: {}", reachability);

    println!("\nModels:");
    for model in &status.models {
        println!("  {} [{}] {}", model.id, model.kind, model.model_name);
    }

    let stats = &status.db_stats;
    println!("\nIngestion (up to {} files at once):", status.max_concurrent_files);
    println!("  Knowledge bases: {}", stats.knowledge_base_count);
    println!("  Files: {}", stats.file_count);
    println!("    Unprocessed: {}", stats.unprocessed);
    println!("    Processing: {}", stats.processing);
    println!("    Processed: {}", stats.processed);
    println!("    Failed: {}", stats.process_failed);
    println!("  Chunks: {}", stats.chunk_count);
    println!("  Registered dataset files: {}", stats.dataset_file_count);
}
