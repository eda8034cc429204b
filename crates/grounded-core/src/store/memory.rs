//! In-memory [`ChunkStore`] implementation for tests and small corpora.
//!
//! Chunks and vectors live in a `Vec` behind `std::sync::RwLock`.
//! Search is brute-force cosine similarity over every stored vector.

use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::relevance_score;
use crate::models::{Chunk, ScoredChunk};

use super::ChunkStore;

struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        let stored = self
            .chunks
            .read()
            .map_err(|_| anyhow!("chunk store lock poisoned"))?;
        let mut results: Vec<ScoredChunk> = stored
            .iter()
            .map(|sc| ScoredChunk::new(sc.chunk.clone(), Some(relevance_score(query_vec, &sc.vector))))
            .collect();
        results.sort_by(|a, b| {
            b.sort_score()
                .partial_cmp(&a.sort_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);
        Ok(results)
    }

    async fn insert_chunks(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != vectors.len() {
            bail!(
                "insert_chunks: {} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        let mut stored = self
            .chunks
            .write()
            .map_err(|_| anyhow!("chunk store lock poisoned"))?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            if let Some(id) = &chunk.metadata.chunk_id {
                stored.retain(|sc| sc.chunk.metadata.chunk_id.as_ref() != Some(id));
            }
            stored.push(StoredChunk {
                chunk: chunk.clone(),
                vector: vector.clone(),
            });
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.chunks
            .write()
            .map_err(|_| anyhow!("chunk store lock poisoned"))?
            .clear();
        Ok(())
    }

    async fn replace_all(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != vectors.len() {
            bail!(
                "replace_all: {} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        let fresh = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| StoredChunk {
                chunk: chunk.clone(),
                vector: vector.clone(),
            })
            .collect();
        *self
            .chunks
            .write()
            .map_err(|_| anyhow!("chunk store lock poisoned"))? = fresh;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self
            .chunks
            .read()
            .map_err(|_| anyhow!("chunk store lock poisoned"))?
            .len())
    }
}
