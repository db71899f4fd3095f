//! Ingestion pipeline orchestration.
//!
//! Coordinates the full indexing flow: load → segment → assign IDs →
//! deduplicate against the store → embed → persist. Chunk IDs are
//! stable across runs (see [`crate::identity`]), so re-running on an
//! unchanged document tree inserts nothing.

use anyhow::Result;
use std::collections::HashSet;

use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::identity::assign_chunk_ids;
use crate::loader;
use crate::models::Chunk;
use crate::segment::split_documents;
use crate::store::{SqliteStore, VectorStore};

/// Counters reported after an ingest run.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub documents: usize,
    pub chunks: usize,
    pub new_chunks: usize,
}

/// Keep only chunks whose ID is not already in the store.
pub fn filter_new_chunks(chunks: Vec<Chunk>, existing: &HashSet<String>) -> Vec<Chunk> {
    chunks
        .into_iter()
        .filter(|chunk| !existing.contains(&chunk.id))
        .collect()
}

pub async fn run_ingest(
    config: &Config,
    reset: bool,
    dry_run: bool,
    limit: Option<usize>,
) -> Result<()> {
    let store = SqliteStore::open(&config.store).await?;

    if reset {
        store.reset().await?;
        println!("cleared collection '{}'", config.store.collection);
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let summary = ingest_into(&store, embedder.as_ref(), config, dry_run, limit).await?;

    if dry_run {
        println!("ingest {} (dry-run)", config.documents.root.display());
    } else {
        println!("ingest {}", config.documents.root.display());
    }
    println!(
        "  files loaded: {} (skipped: {})",
        summary.files_loaded, summary.files_skipped
    );
    println!("  documents: {}", summary.documents);
    println!("  chunks: {}", summary.chunks);
    if summary.new_chunks == 0 {
        println!("  no new chunks to add");
    } else if dry_run {
        println!("  new chunks (not written): {}", summary.new_chunks);
    } else {
        println!("  new chunks added: {}", summary.new_chunks);
    }
    println!("ok");

    store.close().await;
    Ok(())
}

/// Core ingest over any store/embedder pair (separated from
/// [`run_ingest`] so tests can drive it with in-memory collaborators).
pub async fn ingest_into(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    config: &Config,
    dry_run: bool,
    limit: Option<usize>,
) -> Result<IngestSummary> {
    let report = loader::load_documents(&config.documents)?;

    let mut documents = report.documents;
    if let Some(lim) = limit {
        documents.truncate(lim);
    }

    let segments = split_documents(&documents, &config.chunking);
    let chunks = assign_chunk_ids(&segments);

    let existing = store.existing_ids().await?;
    let new_chunks = filter_new_chunks(chunks.clone(), &existing);

    let summary = IngestSummary {
        files_loaded: report.files_loaded,
        files_skipped: report.files_skipped.len(),
        documents: documents.len(),
        chunks: chunks.len(),
        new_chunks: new_chunks.len(),
    };

    if dry_run || new_chunks.is_empty() {
        return Ok(summary);
    }

    let mut vectors = Vec::with_capacity(new_chunks.len());
    for batch in new_chunks.chunks(config.embedding.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let mut batch_vectors = embedder.embed(&texts).await?;
        vectors.append(&mut batch_vectors);
    }

    store.add(&new_chunks, &vectors, embedder.model_name()).await?;

    Ok(summary)
}
