//! SQLite schema definition

/// SQL schema for the metadata database
pub const SCHEMA_SQL: &str = r#"
-- Knowledge bases: name doubles as the vector collection name
CREATE TABLE IF NOT EXISTS knowledge_bases (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    kb_type TEXT NOT NULL DEFAULT 'DOCUMENT',
    embedding_model TEXT NOT NULL,
    chat_model TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Indexed files: one row per file admitted to a knowledge base
CREATE TABLE IF NOT EXISTS indexed_files (
    id TEXT PRIMARY KEY,
    knowledge_base_id TEXT NOT NULL REFERENCES knowledge_bases(id),
    source_file_id TEXT NOT NULL,
    file_name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'UNPROCESSED',
    chunk_count INTEGER,
    error_message TEXT,
    process_options TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Dataset files: catalog of files the resolver can hand to the pipeline
CREATE TABLE IF NOT EXISTS dataset_files (
    id TEXT PRIMARY KEY,
    dataset_id TEXT NOT NULL,
    file_name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    file_type TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Lineage edges: provenance between datasets and knowledge bases
CREATE TABLE IF NOT EXISTS lineage_edges (
    from_id TEXT NOT NULL,
    edge_type TEXT NOT NULL,
    to_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(from_id, edge_type, to_id)
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_files_kb ON indexed_files(knowledge_base_id);
CREATE INDEX IF NOT EXISTS idx_files_kb_status ON indexed_files(knowledge_base_id, status);
CREATE INDEX IF NOT EXISTS idx_dataset_files_dataset ON dataset_files(dataset_id);
CREATE INDEX IF NOT EXISTS idx_lineage_to ON lineage_edges(to_id);
"#;
