//! Knowledge base commands

use crate::error::Result;
use crate::knowledge::{
    KnowledgeBaseSummary, KnowledgeBaseUpdate, KnowledgeService, NewKnowledgeBase, Paged,
};
use crate::meta::KnowledgeBase;
use tracing::info;

/// Create a knowledge base
pub async fn cmd_kb_create(service: &KnowledgeService, request: NewKnowledgeBase) -> Result<KnowledgeBase> {
    info!("Creating knowledge base {}", request.name);
    service.create(request).await
}

/// Rename and/or re-describe a knowledge base given by id or name
pub async fn cmd_kb_update(
    service: &KnowledgeService,
    kb: &str,
    update: KnowledgeBaseUpdate,
) -> Result<KnowledgeBase> {
    let current = service.resolve(kb).await?;
    service.update(&current.id, update).await
}

/// Delete a knowledge base; returns the removed record
pub async fn cmd_kb_delete(service: &KnowledgeService, kb: &str) -> Result<KnowledgeBase> {
    let current = service.resolve(kb).await?;
    service.delete(&current.id).await?;
    Ok(current)
}

pub async fn cmd_kb_show(service: &KnowledgeService, kb: &str) -> Result<KnowledgeBaseSummary> {
    let current = service.resolve(kb).await?;
    service.get(&current.id).await
}

pub async fn cmd_kb_list(
    service: &KnowledgeService,
    page: u64,
    size: u64,
) -> Result<Paged<KnowledgeBaseSummary>> {
    service.list(page, size).await
}

/// Print one knowledge base
pub fn print_knowledge_base(summary: &KnowledgeBaseSummary) {
    let kb = &summary.knowledge_base;
    println!("• {} [{}]", kb.name, kb.kb_type);
    println!("  ID: {}", kb.id);
    if let Some(description) = &kb.description {
        println!("  Description: {}", description);
    }
    println!("  Embedding model: {}", kb.embedding_model);
    if let Some(chat) = &kb.chat_model {
        println!("  Chat model: {}", chat);
    }
    println!(
        "  Files: {}, Chunks: {}",
        summary.file_count, summary.chunk_count
    );
    println!("  Created: {}", kb.created_at);
}

/// Print a page of knowledge bases
pub fn print_knowledge_bases(page: &Paged<KnowledgeBaseSummary>) {
    println!("\n📚 Knowledge Bases\n");

    if page.items.is_empty() {
        println!("No knowledge bases. Use 'ragindex kb create' to add one.");
        return;
    }

    for summary in &page.items {
        print_knowledge_base(summary);
        println!();
    }
    println!(
        "Page {}/{} ({} total)",
        page.page,
        page.total_pages.max(1),
        page.total
    );
}
