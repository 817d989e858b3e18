//! ragindex CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use ragindex::{
    chunk::ProcessOptions,
    commands::{
        cmd_chunks, cmd_files_add, cmd_files_delete, cmd_files_list, cmd_files_register,
        cmd_files_retry, cmd_init, cmd_kb_create, cmd_kb_delete, cmd_kb_list, cmd_kb_show,
        cmd_kb_update, cmd_search, cmd_status, print_add_report, print_chunks, print_files,
        print_init, print_knowledge_base, print_knowledge_bases, print_registered,
        print_search_results, print_status, AddFilesOptions,
    },
    config::{Config, ModelKind},
    error::{Error, Result},
    knowledge::{KnowledgeBaseUpdate, KnowledgeService, NewKnowledgeBase},
    meta::{KnowledgeBaseType, MetaDb},
    progress::LogWriterFactory,
    store,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ragindex")]
#[command(version, about = "Knowledge-base manager and document ingestion pipeline for hybrid retrieval", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration and create the metadata database
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Show configuration, ingestion totals and vector engine reachability
    Status,

    /// Manage knowledge bases
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },

    /// Register source files and manage knowledge-base files
    Files {
        #[command(subcommand)]
        action: FilesAction,
    },

    /// List the indexed chunks of one file
    Chunks {
        /// Knowledge base id or name
        kb: String,

        /// Indexed file id (see 'ragindex files list')
        file_id: String,

        #[arg(long, default_value = "1")]
        page: u64,

        #[arg(long, default_value = "20")]
        size: u64,
    },

    /// Hybrid search within a knowledge base
    Search {
        /// Knowledge base id or name
        kb: String,

        /// The search query
        query: String,

        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum KbAction {
    /// Create a knowledge base
    Create {
        /// Name; also the vector collection name
        name: String,

        #[arg(short, long)]
        description: Option<String>,

        /// DOCUMENT or GRAPH
        #[arg(long = "type", default_value = "DOCUMENT")]
        kb_type: String,

        /// Embedding model id (defaults to the first registered embedding model)
        #[arg(long)]
        embedding_model: Option<String>,

        /// Chat model id
        #[arg(long)]
        chat_model: Option<String>,
    },

    /// Rename or re-describe a knowledge base
    Update {
        /// Knowledge base id or name
        kb: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Delete a knowledge base, its files and its collection
    Delete {
        /// Knowledge base id or name
        kb: String,

        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Show one knowledge base
    Show {
        /// Knowledge base id or name
        kb: String,
    },

    /// List knowledge bases
    List {
        #[arg(long, default_value = "1")]
        page: u64,

        #[arg(long, default_value = "20")]
        size: u64,
    },
}

#[derive(Subcommand)]
enum FilesAction {
    /// Catalog a file or directory tree under a dataset id
    Register {
        /// Dataset id to group the files under
        dataset: String,

        /// File or directory
        path: PathBuf,
    },

    /// Add registered files to a knowledge base and index them
    Add {
        /// Knowledge base id or name
        kb: String,

        /// Registered file ids
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Add every file of these datasets
        #[arg(long = "dataset")]
        datasets: Vec<String>,

        /// paragraph, sentence, length, word or custom_delimiter
        #[arg(long)]
        strategy: Option<String>,

        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(long)]
        overlap_size: Option<usize>,

        /// Regex used by the custom_delimiter strategy
        #[arg(long)]
        delimiter: Option<String>,
    },

    /// List files of a knowledge base
    List {
        /// Knowledge base id or name
        kb: String,

        #[arg(long, default_value = "1")]
        page: u64,

        #[arg(long, default_value = "20")]
        size: u64,
    },

    /// Remove files and their chunks from a knowledge base
    Delete {
        /// Knowledge base id or name
        kb: String,

        /// Indexed file ids
        #[arg(required = true)]
        file_ids: Vec<String>,
    },

    /// Re-run ingestion for files that are not yet processed
    Retry {
        /// Knowledge base id or name
        kb: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(LogWriterFactory))
            .with(filter)
            .init();
    }

    match cli.command {
        Commands::Init { force } => {
            let result = cmd_init(base_dir(cli.config.as_deref()), force).await?;
            emit(cli.json, &result, print_init)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "ragindex", &mut std::io::stdout());
        }
        Commands::Status => {
            let config = load_config(cli.config.as_deref())?;
            let db = MetaDb::connect(&config).await?;
            let engine = store::connect(&config)?;
            let status = cmd_status(&config, &db, engine).await?;
            emit(cli.json, &status, print_status)?;
        }
        Commands::Kb { action } => {
            let config = load_config(cli.config.as_deref())?;
            let service = KnowledgeService::from_config(&config).await?;
            handle_kb(&config, &service, action, cli.json).await?;
        }
        Commands::Files { action } => {
            let config = load_config(cli.config.as_deref())?;
            handle_files(&config, action, cli.json).await?;
        }
        Commands::Chunks {
            kb,
            file_id,
            page,
            size,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let service = KnowledgeService::from_config(&config).await?;
            let chunks = cmd_chunks(&service, &kb, &file_id, page, size).await?;
            emit(cli.json, &chunks, print_chunks)?;
        }
        Commands::Search { kb, query, top_k } => {
            let config = load_config(cli.config.as_deref())?;
            let service = KnowledgeService::from_config(&config).await?;
            let top_k = top_k.unwrap_or(config.search.default_top_k);
            let results = cmd_search(&service, &kb, &query, top_k).await?;
            emit(cli.json, &results, print_search_results)?;
        }
    }

    Ok(())
}

fn emit<T: Serialize>(json: bool, value: &T, print: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print(value);
    }
    Ok(())
}

/// A `.toml` path names the config file; anything else names its directory
fn base_dir(path: Option<&Path>) -> Option<PathBuf> {
    path.map(|p| {
        if p.extension().is_some_and(|e| e == "toml") {
            p.parent().map(PathBuf::from).unwrap_or_else(Config::default_base_dir)
        } else {
            p.to_path_buf()
        }
    })
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = match path {
        Some(p) if p.extension().is_some_and(|e| e == "toml") => p.to_path_buf(),
        Some(p) => p.join("config.toml"),
        None => Config::default_config_path(),
    };
    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }
    Config::load(&config_path)
}

async fn handle_kb(config: &Config, service: &KnowledgeService, action: KbAction, json: bool) -> Result<()> {
    match action {
        KbAction::Create {
            name,
            description,
            kb_type,
            embedding_model,
            chat_model,
        } => {
            let embedding_model = match embedding_model {
                Some(id) => id,
                None => config
                    .models
                    .iter()
                    .find(|m| m.kind == ModelKind::Embedding)
                    .map(|m| m.id.clone())
                    .ok_or_else(|| {
                        Error::Validation("no embedding model registered; pass --embedding-model".to_string())
                    })?,
            };
            let kb = cmd_kb_create(
                service,
                NewKnowledgeBase {
                    name,
                    description,
                    kb_type: kb_type.parse::<KnowledgeBaseType>()?,
                    embedding_model,
                    chat_model,
                },
            )
            .await?;
            emit(json, &kb, |kb| {
                println!("✓ Created knowledge base '{}'", kb.name);
                println!("  ID: {}", kb.id);
            })?;
        }
        KbAction::Update {
            kb,
            name,
            description,
        } => {
            let updated = cmd_kb_update(service, &kb, KnowledgeBaseUpdate { name, description }).await?;
            emit(json, &updated, |kb| println!("✓ Updated knowledge base '{}'", kb.name))?;
        }
        KbAction::Delete { kb, yes } => {
            if !yes {
                return Err(Error::Validation(format!(
                    "deleting '{}' removes all its files and chunks; run with --yes to confirm",
                    kb
                )));
            }
            let removed = cmd_kb_delete(service, &kb).await?;
            emit(json, &removed, |kb| println!("✓ Knowledge base '{}' deleted", kb.name))?;
        }
        KbAction::Show { kb } => {
            let summary = cmd_kb_show(service, &kb).await?;
            emit(json, &summary, print_knowledge_base)?;
        }
        KbAction::List { page, size } => {
            let page = cmd_kb_list(service, page, size).await?;
            emit(json, &page, print_knowledge_bases)?;
        }
    }
    Ok(())
}

fn process_options(
    config: &Config,
    strategy: Option<String>,
    chunk_size: Option<usize>,
    overlap_size: Option<usize>,
    delimiter: Option<String>,
) -> Result<Option<ProcessOptions>> {
    if strategy.is_none() && chunk_size.is_none() && overlap_size.is_none() && delimiter.is_none() {
        return Ok(None);
    }

    let mut options = config.chunk.clone();
    if let Some(strategy) = strategy {
        options.strategy = strategy.parse()?;
    }
    if let Some(size) = chunk_size {
        options.chunk_size = size;
    }
    if let Some(overlap) = overlap_size {
        options.overlap_size = overlap;
    }
    if delimiter.is_some() {
        options.delimiter = delimiter;
    }
    Ok(Some(options))
}

async fn handle_files(config: &Config, action: FilesAction, json: bool) -> Result<()> {
    let service = match action {
        FilesAction::Register { dataset, path } => {
            let db = MetaDb::connect(config).await?;
            if !db.is_initialized().await? {
                return Err(Error::NotInitialized);
            }
            let files = cmd_files_register(&db, &dataset, &path).await?;
            return emit(json, &files, |files| print_registered(files));
        }
        _ => KnowledgeService::from_config(config).await?,
    };

    match action {
        FilesAction::Register { .. } => {}
        FilesAction::Add {
            kb,
            sources,
            datasets,
            strategy,
            chunk_size,
            overlap_size,
            delimiter,
        } => {
            let options = AddFilesOptions {
                source_ids: sources,
                datasets,
                process: process_options(config, strategy, chunk_size, overlap_size, delimiter)?,
                show_progress: !json,
            };
            let report = cmd_files_add(&service, &kb, options).await?;
            emit(json, &report, print_add_report)?;
        }
        FilesAction::List { kb, page, size } => {
            let files = cmd_files_list(&service, &kb, page, size).await?;
            emit(json, &files, print_files)?;
        }
        FilesAction::Delete { kb, file_ids } => {
            let removed = cmd_files_delete(&service, &kb, &file_ids).await?;
            emit(json, &removed, |n| println!("✓ Removed {} files", n))?;
        }
        FilesAction::Retry { kb } => {
            let report = cmd_files_retry(&service, &kb).await?;
            emit(json, &report, print_add_report)?;
        }
    }
    Ok(())
}
