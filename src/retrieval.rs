//! Retrieval service adapter.
//!
//! Wraps query embedding plus vector-store similarity search behind one
//! call. Ranking semantics are fixed here in one place: **higher
//! similarity score ranks first**, and results are re-sorted descending
//! regardless of what the backend returned, so callers never have to
//! reason about raw-distance vs similarity ordering.
//!
//! No retries: embedding or store failures propagate to the caller as
//! retrieval errors.

use anyhow::Result;
use std::sync::Arc;

use crate::embedding::Embedder;
use crate::models::ScoredChunk;
use crate::store::VectorStore;

pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// The `k` most similar chunks to `query`, best first.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query_vec = self.embedder.embed_query(query).await?;
        let mut hits = self.store.similarity_search(&query_vec, k).await?;

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(hits)
    }
}
