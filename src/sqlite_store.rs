//! SQLite-backed [`ChunkStore`] implementation.
//!
//! Chunks live in the `chunks` table with their metadata flattened into
//! columns; vectors live in `chunk_vectors` as little-endian f32 BLOBs.
//! Search is brute-force cosine similarity: every vector is scored, the
//! best `limit` ids are kept, and only those rows are hydrated.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};

use grounded_core::embedding::{blob_to_vec, relevance_score, vec_to_blob};
use grounded_core::models::{Chunk, ChunkMetadata, MetaValue, ScoredChunk};
use grounded_core::store::ChunkStore;

/// SQLite implementation of the [`ChunkStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_chunks(&self, ids: &[String]) -> Result<HashMap<String, Chunk>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, doc_id, source, doc_type, section_path, json_path, title, \
             chunk_index, n_chunks, start_index, content, extra_json \
             FROM chunks WHERE id IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            out.insert(id, row_to_chunk(row)?);
        }
        Ok(out)
    }
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    let extra_json: String = row.get("extra_json");
    let extra: BTreeMap<String, MetaValue> = serde_json::from_str(&extra_json)
        .with_context(|| format!("Invalid extra_json for chunk {}", row.get::<String, _>("id")))?;

    Ok(Chunk::new(
        row.get::<String, _>("content"),
        ChunkMetadata {
            source: row.get("source"),
            doc_type: row.get("doc_type"),
            section_path: row.get("section_path"),
            json_path: row.get("json_path"),
            title: row.get("title"),
            doc_id: row.get("doc_id"),
            chunk_id: Some(row.get("id")),
            chunk_index: row.get("chunk_index"),
            n_chunks: row.get("n_chunks"),
            start_index: row.get("start_index"),
            extra,
        },
    ))
}

fn check_lengths(chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != vectors.len() {
        anyhow::bail!(
            "insert_chunks: {} chunks but {} vectors",
            chunks.len(),
            vectors.len()
        );
    }
    Ok(())
}

async fn delete_all(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("DELETE FROM chunk_vectors")
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM chunks").execute(&mut *conn).await?;
    Ok(())
}

/// Upsert rows on an open connection; the caller owns the transaction.
async fn write_chunks(conn: &mut SqliteConnection, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    for (chunk, vector) in chunks.iter().zip(vectors) {
        let id = chunk.dedup_key();
        let meta = &chunk.metadata;
        let extra_json = serde_json::to_string(&meta.extra)?;

        sqlx::query(
            r#"
            INSERT INTO chunks (id, doc_id, source, doc_type, section_path, json_path, title,
                                chunk_index, n_chunks, start_index, content, extra_json, indexed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                doc_id = excluded.doc_id,
                source = excluded.source,
                doc_type = excluded.doc_type,
                section_path = excluded.section_path,
                json_path = excluded.json_path,
                title = excluded.title,
                chunk_index = excluded.chunk_index,
                n_chunks = excluded.n_chunks,
                start_index = excluded.start_index,
                content = excluded.content,
                extra_json = excluded.extra_json,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(&id)
        .bind(&meta.doc_id)
        .bind(&meta.source)
        .bind(&meta.doc_type)
        .bind(&meta.section_path)
        .bind(&meta.json_path)
        .bind(&meta.title)
        .bind(meta.chunk_index)
        .bind(meta.n_chunks)
        .bind(meta.start_index)
        .bind(&chunk.content)
        .bind(&extra_json)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (chunk_id, embedding) VALUES (?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET embedding = excluded.embedding
            "#,
        )
        .bind(&id)
        .bind(vec_to_blob(vector))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT chunk_id, embedding FROM chunk_vectors ORDER BY chunk_id")
            .fetch_all(&self.pool)
            .await?;

        let mut scored: Vec<(String, f32)> = rows
            .iter()
            .map(|row| {
                let id: String = row.get("chunk_id");
                let blob: Vec<u8> = row.get("embedding");
                (id, relevance_score(query_vec, &blob_to_vec(&blob)))
            })
            .collect();

        // Rows arrive ordered by id, so the stable sort breaks ties by id.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        let ids: Vec<String> = scored.iter().map(|(id, _)| id.clone()).collect();
        let mut chunks = self.fetch_chunks(&ids).await?;

        Ok(scored
            .into_iter()
            .filter_map(|(id, score)| chunks.remove(&id).map(|c| ScoredChunk::new(c, Some(score))))
            .collect())
    }

    async fn insert_chunks(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_lengths(chunks, vectors)?;
        let mut tx = self.pool.begin().await?;
        write_chunks(&mut *tx, chunks, vectors).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        delete_all(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete and insert in one transaction. An error rolls back to the
    /// previous index when `tx` is dropped.
    async fn replace_all(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_lengths(chunks, vectors)?;
        let mut tx = self.pool.begin().await?;
        delete_all(&mut *tx).await?;
        write_chunks(&mut *tx, chunks, vectors).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}
