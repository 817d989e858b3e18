//! ragindex - knowledge-base lifecycle manager and document ingestion pipeline
//!
//! This crate provides:
//! - Knowledge bases whose names stay in step with their vector collections
//! - A bounded-concurrency pipeline that parses, splits, embeds and indexes files
//! - Hybrid (vector + lexical) search and per-file chunk inspection
//! - Qdrant and in-process vector engines behind one trait

pub mod chunk;
pub mod commands;
pub mod config;
pub mod embed;
pub mod embedding_backend;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod knowledge;
pub mod lineage;
pub mod meta;
pub mod parse;
pub mod progress;
pub mod rank;
pub mod sources;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
