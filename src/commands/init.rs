//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// Where init wrote its files
#[derive(Debug, Clone, Serialize)]
pub struct InitResult {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub db_path: PathBuf,
}

/// Write a default config and create the metadata schema.
///
/// An existing config is only replaced with `force`; the database schema is
/// created idempotently either way.
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<InitResult> {
    let mut config = Config::default();
    config.init_paths(base_dir);

    if config.paths.config_file.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config.paths.config_file.display()
        )));
    }

    config.validate()?;
    config.save()?;

    let db = MetaDb::connect(&config).await?;
    db.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    Ok(InitResult {
        base_dir: config.paths.base_dir,
        config_path: config.paths.config_file,
        db_path: config.paths.db_file,
    })
}

pub fn print_init(result: &InitResult) {
    println!("✓ Initialized ragindex at {}", result.base_dir.display());
    println!("\nConfiguration: {}", result.config_path.display());
    println!("Database: {}", result.db_path.display());
    println!("\nNext steps:");
    println!("  ragindex files register docs ./path/to/docs      # Catalog source files");
    println!("  ragindex kb create manuals                       # Create a knowledge base");
    println!("  ragindex files add manuals --dataset docs        # Index the files");
    println!("  ragindex search manuals \"how do I install\"       # Search it");
}
