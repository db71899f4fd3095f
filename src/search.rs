//! Direct retrieval inspection (`cadsmith search`).
//!
//! Runs a query through the retrieval adapter without the generation
//! flow and prints the ranked chunks. Useful for checking what the
//! index would hand a generation run before spending LLM calls.

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding;
use crate::retrieval::Retriever;
use crate::store::SqliteStore;

pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let store = Arc::new(SqliteStore::open(&config.store).await?);
    let embedder = embedding::create_embedder(&config.embedding)?;
    let retriever = Retriever::new(store.clone(), embedder);

    let k = limit.unwrap_or(config.retrieval.top_k);
    let hits = retriever.retrieve(query, k).await?;

    if hits.is_empty() {
        println!("No results.");
        store.close().await;
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let excerpt: String = hit.chunk.content.chars().take(240).collect();
        println!("{}. [{:.3}] {}", i + 1, hit.score, hit.chunk.id);
        println!("    source: {}", hit.chunk.source);
        if let Some(page) = hit.chunk.page {
            println!("    page: {}", page);
        }
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
        println!();
    }

    store.close().await;
    Ok(())
}
