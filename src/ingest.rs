//! Ingestion pipeline orchestration.
//!
//! Coordinates a full reindex: scan → load → split → provenance → embed →
//! store. Every run rebuilds the index from scratch, so chunk ids stay
//! stable for an unchanged corpus and deleted files disappear from it.
//!
//! All vectors are computed before the store is touched, and the swap
//! itself is a single [`ChunkStore::replace_all`]. A provider failure or a
//! failed write leaves the previous index intact.

use anyhow::{bail, Context, Result};
use tracing::info;

use grounded_core::chunk::{assign_provenance, split_text, SplitConfig};
use grounded_core::embedding::Embedder;
use grounded_core::models::Chunk;
use grounded_core::store::ChunkStore;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::loader::{load_file, scan_files, SourceDoc};
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Counts reported after an ingest run.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub files: usize,
    pub passages: usize,
    pub chunks: Vec<Chunk>,
    pub chunks_written: usize,
}

impl IngestReport {
    /// Up to three chunk ids, for a quick sanity check.
    pub fn sample_ids(&self) -> Vec<String> {
        self.chunks
            .iter()
            .take(3)
            .map(|c| {
                format!(
                    "{} :: {}",
                    c.source().unwrap_or("?"),
                    c.metadata.chunk_id.as_deref().unwrap_or("?")
                )
            })
            .collect()
    }
}

pub async fn run_ingest(config: &Config, dry_run: bool) -> Result<()> {
    let mut report = prepare(config)?;

    if dry_run {
        println!("ingest {} (dry-run)", config.ingest.data_dir.display());
        println!("  files: {}", report.files);
        println!("  passages: {}", report.passages);
        println!("  chunks: {}", report.chunks.len());
        for id in report.sample_ids() {
            println!("  • {}", id);
        }
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        bail!("ingest requires an embedding provider; set [embedding].provider in the config");
    }
    let embedder = create_embedder(&config.embedding)?;

    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let store = SqliteStore::new(pool);

    report.chunks_written = index_chunks(
        &report.chunks,
        embedder.as_ref(),
        &store,
        config.embedding.batch_size,
    )
    .await?;

    println!("ingest {}", config.ingest.data_dir.display());
    println!("  files: {}", report.files);
    println!("  passages: {}", report.passages);
    println!("  chunks written: {}", report.chunks_written);
    println!("  model: {}", embedder.model_name());
    println!("ok");
    for id in report.sample_ids() {
        println!("  • {}", id);
    }

    store.pool().close().await;
    Ok(())
}

/// Scan, load, split and stamp provenance. No I/O beyond reading files.
pub fn prepare(config: &Config) -> Result<IngestReport> {
    let files = scan_files(&config.ingest)?;
    let passages: Vec<SourceDoc> = files
        .iter()
        .flat_map(|f| load_file(f, &config.ingest))
        .collect();
    info!(files = files.len(), passages = passages.len(), "loaded documents");

    let split = config.ingest.split_config();
    let chunks = chunk_passages(&passages, &split);
    info!(chunks = chunks.len(), "chunked documents");

    Ok(IngestReport {
        files: files.len(),
        passages: passages.len(),
        chunks,
        chunks_written: 0,
    })
}

/// Split every passage and assign chunk identity.
///
/// A piece's `start_index` is the passage's base offset plus the piece's
/// offset within the passage.
pub fn chunk_passages(passages: &[SourceDoc], split: &SplitConfig) -> Vec<Chunk> {
    let mut pieces = Vec::new();
    for doc in passages {
        let base = doc.metadata.start_index.unwrap_or(0);
        for span in split_text(&doc.text, split) {
            let mut metadata = doc.metadata.clone();
            metadata.start_index = span.start_index.map(|s| base + s as i64);
            pieces.push(Chunk::new(span.text, metadata));
        }
    }
    assign_provenance(pieces, split.min_chars)
}

/// Embed `chunks` in batches, then replace the store's contents with them.
/// Returns the number of chunks written.
pub async fn index_chunks(
    chunks: &[Chunk],
    embedder: &dyn Embedder,
    store: &dyn ChunkStore,
    batch_size: usize,
) -> Result<usize> {
    let batch_size = batch_size.max(1);
    let mut vectors = Vec::with_capacity(chunks.len());
    for (i, batch) in chunks.chunks(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let mut embedded = embedder
            .embed_batch(&texts)
            .await
            .with_context(|| format!("Embedding batch {} failed", i + 1))?;
        if embedded.len() != batch.len() {
            bail!(
                "embedder returned {} vectors for a batch of {}",
                embedded.len(),
                batch.len()
            );
        }
        vectors.append(&mut embedded);
        info!(done = vectors.len(), total = chunks.len(), "embedded batch");
    }

    store.replace_all(chunks, &vectors).await?;
    Ok(chunks.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use grounded_core::models::ChunkMetadata;
    use grounded_core::store::memory::InMemoryStore;
    use async_trait::async_trait;

    struct LenEmbedder;

    #[async_trait]
    impl Embedder for LenEmbedder {
        fn model_name(&self) -> &str {
            "len"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            bail!("quota exceeded")
        }
    }

    fn passage(source: &str, start: i64, text: &str) -> SourceDoc {
        SourceDoc {
            text: text.to_string(),
            metadata: ChunkMetadata {
                source: Some(source.to_string()),
                section_path: Some("S".to_string()),
                start_index: Some(start),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_chunk_passages_offsets_and_ids() {
        let split = SplitConfig {
            chunk_size: 40,
            chunk_overlap: 0,
            min_chars: 5,
        };
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let chunks = chunk_passages(&[passage("a.md", 100, text)], &split);
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].metadata.start_index, Some(100));
        assert!(chunks[1].metadata.start_index.unwrap() > 100);
        let n = chunks.len();
        assert!(chunks
            .iter()
            .enumerate()
            .all(|(i, c)| c.metadata.chunk_id.as_deref().unwrap().ends_with(&format!(":{}/{}", i + 1, n))));
        assert!(chunks.iter().all(|c| c.content.starts_with("passage: [CTX] S\n")));
    }

    #[tokio::test]
    async fn test_index_replaces_previous_contents() {
        let store = InMemoryStore::new();
        let split = SplitConfig {
            chunk_size: 200,
            chunk_overlap: 0,
            min_chars: 1,
        };
        let first = chunk_passages(
            &[passage("a.md", 0, "first corpus"), passage("b.md", 0, "other file")],
            &split,
        );
        assert_eq!(index_chunks(&first, &LenEmbedder, &store, 1).await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 2);

        let second = chunk_passages(&[passage("a.md", 0, "second corpus")], &split);
        index_chunks(&second, &LenEmbedder, &store, 64).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_keeps_old_index() {
        let store = InMemoryStore::new();
        let split = SplitConfig {
            chunk_size: 200,
            chunk_overlap: 0,
            min_chars: 1,
        };
        let chunks = chunk_passages(&[passage("a.md", 0, "kept")], &split);
        index_chunks(&chunks, &LenEmbedder, &store, 8).await.unwrap();

        let err = index_chunks(&chunks, &FailingEmbedder, &store, 8)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("quota exceeded"));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_old_sqlite_index() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("ingest.sqlite"))
            .await
            .unwrap();
        migrate::migrate_pool(&pool).await.unwrap();
        let store = SqliteStore::new(pool.clone());
        let split = SplitConfig {
            chunk_size: 200,
            chunk_overlap: 0,
            min_chars: 1,
        };

        let old = chunk_passages(&[passage("a.md", 0, "old one"), passage("b.md", 0, "old two")], &split);
        index_chunks(&old, &LenEmbedder, &store, 1).await.unwrap();

        sqlx::query(
            "CREATE TRIGGER reject_bad BEFORE INSERT ON chunks \
             WHEN NEW.source = 'bad.md' BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let new = chunk_passages(&[passage("c.md", 0, "new one"), passage("bad.md", 0, "new two")], &split);
        assert!(index_chunks(&new, &LenEmbedder, &store, 1).await.is_err());

        assert_eq!(store.count().await.unwrap(), 2);
        let sources: Vec<String> = sqlx::query_scalar("SELECT source FROM chunks ORDER BY source")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(sources, vec!["a.md", "b.md"]);
    }
}
