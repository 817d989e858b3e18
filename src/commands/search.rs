//! Search and chunk inspection commands

use crate::error::Result;
use crate::knowledge::{ChunkView, KnowledgeService, Paged, SearchHit};
use serde::Serialize;
use tracing::info;

/// Search results for CLI display
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub knowledge_base: String,
    pub query: String,
    pub hits: Vec<SearchHit>,
}

pub async fn cmd_search(
    service: &KnowledgeService,
    kb: &str,
    query: &str,
    top_k: usize,
) -> Result<SearchResults> {
    let kb = service.resolve(kb).await?;
    info!("Searching {} for: {}", kb.name, query);
    let hits = service.search(&kb.id, query, top_k).await?;
    Ok(SearchResults {
        knowledge_base: kb.name,
        query: query.to_string(),
        hits,
    })
}

pub async fn cmd_chunks(
    service: &KnowledgeService,
    kb: &str,
    file_id: &str,
    page: u64,
    size: u64,
) -> Result<Paged<ChunkView>> {
    let kb = service.resolve(kb).await?;
    service.list_chunks(&kb.id, file_id, page, size).await
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut)
}

/// Print search results
pub fn print_search_results(results: &SearchResults) {
    println!("\n🔍 {} results for: \"{}\" in {}\n", results.hits.len(), results.query, results.knowledge_base);

    if results.hits.is_empty() {
        println!("No results found.");
        return;
    }

    for (i, hit) in results.hits.iter().enumerate() {
        println!("{}. [score: {:.4}] {}", i + 1, hit.score, hit.id);
        println!("   {}", preview(&hit.text, 200));
        println!("   metadata: {}", hit.metadata);
        println!();
    }
}

pub fn print_chunks(page: &Paged<ChunkView>) {
    if page.items.is_empty() {
        println!("No chunks.");
        return;
    }
    for chunk in &page.items {
        println!("• {}", chunk.id);
        println!("  {}", preview(&chunk.text, 300));
    }
    println!(
        "\nPage {}/{} ({} total)",
        page.page,
        page.total_pages.max(1),
        page.total
    );
}
