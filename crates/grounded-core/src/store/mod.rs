//! Storage abstraction for Grounded.
//!
//! The [`ChunkStore`] trait defines the vector-index operations needed by
//! ingestion and the query pipeline, enabling pluggable backends (SQLite
//! in the app crate, [`memory::InMemoryStore`] for tests).
//!
//! Implementations must be `Send + Sync`; the query pipeline only ever
//! reads, so one store handle can serve concurrent queries when the
//! backend allows concurrent readers.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`search`](ChunkStore::search) | Nearest-neighbour search returning scored chunks |
//! | [`insert_chunks`](ChunkStore::insert_chunks) | Store chunks with their vectors |
//! | [`clear`](ChunkStore::clear) | Drop every chunk (full reindex) |
//! | [`count`](ChunkStore::count) | Number of stored chunks |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, ScoredChunk};

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Return up to `limit` chunks ordered by relevance to `query_vec`.
    ///
    /// Scores are in `[0, 1]`. Backends that cannot score return `None`.
    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ScoredChunk>>;

    /// Insert chunks with one vector per chunk, replacing any chunk that
    /// shares a `chunk_id`.
    async fn insert_chunks(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()>;

    /// Remove every stored chunk.
    async fn clear(&self) -> Result<()>;

    /// Swap the whole index for `chunks`.
    ///
    /// The default clears and then inserts. Stores that can do it atomically
    /// override it so a failed rebuild keeps the previous contents.
    async fn replace_all(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        self.clear().await?;
        self.insert_chunks(chunks, vectors).await
    }

    /// Number of stored chunks.
    async fn count(&self) -> Result<usize>;
}
