//! Vector store abstraction.
//!
//! The [`VectorStore`] trait defines the operations the ingestion and
//! query pipelines need from a vector index (existing-ID listing,
//! record insertion, similarity search, and a destructive reset),
//! enabling pluggable backends: SQLite for the CLI, in-memory for
//! tests.
//!
//! Records are created on ingest and never mutated; `reset` is the only
//! way to remove them. A store instance is scoped to one named
//! collection.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

use crate::models::{Chunk, ScoredChunk};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Abstract vector index scoped to a single collection.
///
/// Implementations must be `Send + Sync` to work with async runtimes.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// IDs of every record already in the collection.
    async fn existing_ids(&self) -> Result<HashSet<String>>;

    /// Insert new records. `embeddings` must parallel `chunks`; IDs are
    /// expected to be absent (callers deduplicate first).
    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>], model: &str) -> Result<()>;

    /// Brute-force cosine similarity over the collection, best first.
    async fn similarity_search(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Number of records in the collection.
    async fn count(&self) -> Result<u64>;

    /// Destructively clear the collection. Used when chunking
    /// parameters change and stable IDs would otherwise be reused over
    /// stale content.
    async fn reset(&self) -> Result<()>;
}
