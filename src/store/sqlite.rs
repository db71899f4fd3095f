//! SQLite-backed [`VectorStore`].
//!
//! One `vector_records` table holds every collection; a store instance
//! is scoped to the collection named in its config. Embeddings are
//! stored as little-endian f32 BLOBs and similarity search is
//! brute-force cosine computed in Rust over the collection's vectors.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashSet;
use std::str::FromStr;

use crate::config::StoreConfig;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, ScoredChunk};

use super::VectorStore;

pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteStore {
    /// Open (creating if missing) the database and ensure the schema.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let db_path = &config.path;

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vector_records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                content TEXT NOT NULL,
                source TEXT NOT NULL,
                page INTEGER,
                content_hash TEXT NOT NULL,
                embedding BLOB NOT NULL,
                model TEXT NOT NULL,
                dims INTEGER NOT NULL,
                ingested_at INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_vector_records_collection ON vector_records(collection)",
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            collection: config.collection.clone(),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn existing_ids(&self) -> Result<HashSet<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM vector_records WHERE collection = ?")
                .bind(&self.collection)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().collect())
    }

    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>], model: &str) -> Result<()> {
        if chunks.len() != embeddings.len() {
            bail!(
                "embedding count ({}) does not match chunk count ({})",
                embeddings.len(),
                chunks.len()
            );
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for (chunk, vector) in chunks.iter().zip(embeddings.iter()) {
            let content_hash = content_hash(&chunk.content);
            sqlx::query(
                r#"
                INSERT INTO vector_records
                    (collection, id, content, source, page, content_hash, embedding, model, dims, ingested_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&self.collection)
            .bind(&chunk.id)
            .bind(&chunk.content)
            .bind(&chunk.source)
            .bind(chunk.page)
            .bind(&content_hash)
            .bind(vec_to_blob(vector))
            .bind(model)
            .bind(vector.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn similarity_search(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            "SELECT id, content, source, page, embedding FROM vector_records WHERE collection = ?",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                ScoredChunk {
                    chunk: Chunk {
                        id: row.get("id"),
                        content: row.get("content"),
                        source: row.get("source"),
                        page: row.get("page"),
                    },
                    score: cosine_similarity(query_vec, &vector),
                }
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
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM vector_records WHERE collection = ?")
                .bind(&self.collection)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn reset(&self) -> Result<()> {
        sqlx::query("DELETE FROM vector_records WHERE collection = ?")
            .bind(&self.collection)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// SHA-256 of chunk content, stored with each record for staleness
/// inspection.
fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
