//! Index statistics and health overview.
//!
//! Provides a quick summary of what's indexed: chunk counts, embedding
//! coverage, and per-source breakdowns. Used by `grounded stats` to give
//! confidence that the last ingest did what was expected.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;

/// Per-source chunk counts.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStats {
    pub source: String,
    pub chunk_count: i64,
}

#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub total_chunks: i64,
    pub total_embedded: i64,
    pub last_indexed_at: Option<i64>,
    pub sources: Vec<SourceStats>,
}

impl IndexStats {
    pub fn embedded_percent(&self) -> i64 {
        if self.total_chunks > 0 {
            (self.total_embedded * 100) / self.total_chunks
        } else {
            0
        }
    }
}

/// Query counts from an open, migrated pool.
pub async fn collect_stats(pool: &SqlitePool) -> Result<IndexStats> {
    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(pool)
        .await?;

    let total_embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
        .fetch_one(pool)
        .await?;

    let last_indexed_at: Option<i64> = sqlx::query_scalar("SELECT MAX(indexed_at) FROM chunks")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(
        r#"
        SELECT COALESCE(source, '?') AS source, COUNT(*) AS chunk_count
        FROM chunks
        GROUP BY source
        ORDER BY chunk_count DESC, source ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let sources = rows
        .iter()
        .map(|row| SourceStats {
            source: row.get("source"),
            chunk_count: row.get("chunk_count"),
        })
        .collect();

    Ok(IndexStats {
        total_chunks,
        total_embedded,
        last_indexed_at,
        sources,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let stats = collect_stats(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Grounded Index Stats");
    println!("====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Chunks:      {}", stats.total_chunks);
    println!(
        "  Embedded:    {} / {} ({}%)",
        stats.total_embedded,
        stats.total_chunks,
        stats.embedded_percent()
    );
    println!(
        "  Last ingest: {}",
        stats
            .last_indexed_at
            .map(|ts| describe_ingest_time(ts, Utc::now()))
            .unwrap_or_else(|| "never".to_string())
    );

    if !stats.sources.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<48} {:>8}", "SOURCE", "CHUNKS");
        println!("  {}", "-".repeat(57));
        for s in &stats.sources {
            println!("  {:<48} {:>8}", s.source, s.chunk_count);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Database file size with a binary unit, one decimal above bytes.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Age of the last ingest relative to `now`. Within a week it reads as
/// an age ("45m ago", "3d ago"); older or future stamps print as a UTC date.
fn describe_ingest_time(ts: i64, now: DateTime<Utc>) -> String {
    let Some(at) = DateTime::from_timestamp(ts, 0) else {
        return format!("invalid timestamp {ts}");
    };
    let age = now.signed_duration_since(at);
    if age < Duration::zero() || age >= Duration::days(7) {
        return at.format("%Y-%m-%d %H:%M UTC").to_string();
    }
    if age < Duration::minutes(1) {
        "under a minute ago".to_string()
    } else if age < Duration::hours(1) {
        format!("{}m ago", age.num_minutes())
    } else if age < Duration::days(1) {
        format!("{}h ago", age.num_hours())
    } else {
        format!("{}d ago", age.num_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grounded_core::models::{Chunk, ChunkMetadata};
    use grounded_core::store::ChunkStore;
    use tempfile::TempDir;

    use crate::sqlite_store::SqliteStore;

    fn chunk(source: &str, id: &str) -> Chunk {
        Chunk::new(
            format!("passage: [CTX] x\n{}", id),
            ChunkMetadata {
                source: Some(source.to_string()),
                chunk_id: Some(id.to_string()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_format_bytes_binary_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MiB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024 * 1024), "5.0 TiB");
    }

    #[test]
    fn test_describe_ingest_time() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let ts = now.timestamp();
        assert_eq!(describe_ingest_time(ts - 5, now), "under a minute ago");
        assert_eq!(describe_ingest_time(ts - 45 * 60, now), "45m ago");
        assert_eq!(describe_ingest_time(ts - 2 * 3600, now), "2h ago");
        assert_eq!(describe_ingest_time(ts - 3 * 86_400, now), "3d ago");
        assert_eq!(
            describe_ingest_time(ts - 30 * 86_400, now),
            "2023-10-15 22:13 UTC"
        );
        assert_eq!(describe_ingest_time(ts + 600, now), "2023-11-14 22:23 UTC");
    }

    #[tokio::test]
    async fn test_collect_stats_per_source() {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("stats.sqlite"))
            .await
            .unwrap();
        migrate::migrate_pool(&pool).await.unwrap();

        let empty = collect_stats(&pool).await.unwrap();
        assert_eq!(empty.total_chunks, 0);
        assert_eq!(empty.embedded_percent(), 0);
        assert!(empty.last_indexed_at.is_none());

        let store = SqliteStore::new(pool.clone());
        let chunks = vec![chunk("a.md", "a1"), chunk("b.md", "b1"), chunk("a.md", "a2")];
        let vectors = vec![vec![1.0, 0.0]; 3];
        store.insert_chunks(&chunks, &vectors).await.unwrap();

        let stats = collect_stats(&pool).await.unwrap();
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.embedded_percent(), 100);
        assert!(stats.last_indexed_at.is_some());
        assert_eq!(
            stats.sources,
            vec![
                SourceStats {
                    source: "a.md".into(),
                    chunk_count: 2
                },
                SourceStats {
                    source: "b.md".into(),
                    chunk_count: 1
                },
            ]
        );
    }
}
