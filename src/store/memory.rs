//! In-memory [`VectorStore`] implementation for tests.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`; similarity
//! search is the same brute-force cosine as the SQLite backend.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ScoredChunk};

use super::VectorStore;

struct StoredRecord {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory store for tests and throwaway runs.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<StoredRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn existing_ids(&self) -> Result<HashSet<String>> {
        let records = self.records.read().unwrap();
        Ok(records.iter().map(|r| r.chunk.id.clone()).collect())
    }

    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>], _model: &str) -> Result<()> {
        if chunks.len() != embeddings.len() {
            bail!(
                "embedding count ({}) does not match chunk count ({})",
                embeddings.len(),
                chunks.len()
            );
        }
        let mut records = self.records.write().unwrap();
        for (chunk, vector) in chunks.iter().zip(embeddings.iter()) {
            records.push(StoredRecord {
                chunk: chunk.clone(),
                vector: vector.clone(),
            });
        }
        Ok(())
    }

    async fn similarity_search(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let records = self.records.read().unwrap();
        let mut hits: Vec<ScoredChunk> = records
            .iter()
            .map(|r| ScoredChunk {
                chunk: r.chunk.clone(),
                score: cosine_similarity(query_vec, &r.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.records.read().unwrap().len() as u64)
    }

    async fn reset(&self) -> Result<()> {
        self.records.write().unwrap().clear();
        Ok(())
    }
}
