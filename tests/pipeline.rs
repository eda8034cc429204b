//! End-to-end query tests: real loaders, splitter and SQLite store, with
//! deterministic test doubles standing in for the models.

use std::fs;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use grounded::config::{parse_config, Config};
use grounded::{db, ingest, migrate, sqlite_store::SqliteStore};
use grounded_core::answer::Answerer;
use grounded_core::embedding::{l2_normalize, Embedder};
use grounded_core::pipeline::{PipelineParams, QueryPipeline, QueryStage, REFUSAL_MESSAGE};
use grounded_core::rerank::{RerankStage, Reranker};
use grounded_core::store::ChunkStore;
use grounded_core::Outcome;

const DIMS: usize = 256;

/// Bag-of-words embedder: each lowercase word is hashed into one of
/// `DIMS` buckets.
struct HashEmbedder;

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf29ce484222325, |h, b| {
        (h ^ b as u64).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; DIMS];
                for word in t
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    v[(fnv1a(&word.to_lowercase()) % DIMS as u64) as usize] += 1.0;
                }
                l2_normalize(&mut v);
                v
            })
            .collect())
    }
}

#[derive(Default)]
struct RecordingAnswerer {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl Answerer for RecordingAnswerer {
    fn model_name(&self) -> &str {
        "recording"
    }
    async fn generate(&self, _system: &str, user: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(user.to_string());
        Ok("Open the account page and follow the emailed link.".to_string())
    }
}

struct FailingReranker;

#[async_trait]
impl Reranker for FailingReranker {
    fn model_name(&self) -> &str {
        "failing"
    }
    async fn score(&self, _query: &str, _passages: &[&str]) -> Result<Vec<f32>> {
        bail!("model file missing")
    }
}

const GUIDE_MD: &str = "# Guide\n\n\
Grounded answers questions from your own documents. It indexes Markdown and JSON files \
from a single data directory and keeps the file name of every passage.\n\n\
## Install\n\n\
Build the binary with cargo and copy the example configuration next to it. The local \
embedding model is downloaded on first use and cached for later runs.\n";

const FAQ_JSON: &str = r#"[
  {"title": "Reset", "content": "To reset your password open the account page, choose security, and follow the emailed password reset link within one hour."},
  {"title": "Export", "content": "Exports are produced nightly as compressed archives and kept for thirty days before they are deleted."}
]"#;

struct Env {
    _tmp: TempDir,
    config: Config,
    store: Arc<SqliteStore>,
}

async fn indexed_env() -> Env {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let docs = root.join("docs");
    fs::create_dir_all(docs.join("faq")).unwrap();
    fs::write(docs.join("guide.md"), GUIDE_MD).unwrap();
    fs::write(docs.join("faq").join("account.json"), FAQ_JSON).unwrap();

    let config = parse_config(&format!(
        "[db]\npath = \"{root}/grounded.sqlite\"\n\n\
         [ingest]\ndata_dir = \"{root}/docs\"\nmin_chars = 20\njson_leaf_passages = false\n",
        root = root.display()
    ))
    .unwrap();

    let pool = db::connect(&config).await.unwrap();
    migrate::migrate_pool(&pool).await.unwrap();
    let store = Arc::new(SqliteStore::new(pool));

    let report = ingest::prepare(&config).unwrap();
    assert_eq!(report.files, 2);
    ingest::index_chunks(&report.chunks, &HashEmbedder, store.as_ref(), 2)
        .await
        .unwrap();

    Env {
        _tmp: tmp,
        config,
        store,
    }
}

fn params(min_context_chars: usize, use_reranker: bool) -> PipelineParams {
    PipelineParams {
        top_k: 3,
        fetch_k: 8,
        score_threshold: 0.0,
        min_context_chars,
        use_reranker,
        per_source_cap: 2,
    }
}

fn pipeline(
    env: &Env,
    reranker: RerankStage,
    answerer: Arc<RecordingAnswerer>,
    params: PipelineParams,
) -> QueryPipeline {
    QueryPipeline::new(
        Arc::new(HashEmbedder),
        env.store.clone(),
        reranker,
        answerer,
        params,
    )
}

#[tokio::test]
async fn test_ingest_writes_every_chunk() {
    let env = indexed_env().await;
    let report = ingest::prepare(&env.config).unwrap();
    assert_eq!(report.passages, 4);
    assert_eq!(env.store.count().await.unwrap(), report.chunks.len());
}

#[tokio::test]
async fn test_reindex_is_stable() {
    let env = indexed_env().await;
    let before = ingest::prepare(&env.config).unwrap();
    ingest::index_chunks(&before.chunks, &HashEmbedder, env.store.as_ref(), 64)
        .await
        .unwrap();
    let after = ingest::prepare(&env.config).unwrap();

    let ids = |r: &ingest::IngestReport| -> Vec<Option<String>> {
        r.chunks.iter().map(|c| c.metadata.chunk_id.clone()).collect()
    };
    assert_eq!(ids(&before), ids(&after));
    assert_eq!(env.store.count().await.unwrap(), after.chunks.len());
}

#[tokio::test]
async fn test_answer_cites_the_matching_file() {
    let env = indexed_env().await;
    let answerer = Arc::new(RecordingAnswerer::default());
    let p = pipeline(&env, RerankStage::disabled(), answerer.clone(), params(10, false));

    let answer = p.answer("How do I reset my password?").await.unwrap();
    assert_eq!(answer.outcome, Outcome::Answered);
    assert_eq!(answer.citations[0], "faq/account.json");
    assert_eq!(answer.stages.last(), Some(&QueryStage::Answered));

    let prompts = answerer.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].starts_with("Question: How do I reset my password?\n\nContext:\n"));
    assert!(prompts[0].contains("[1] source: faq/account.json | chunk: "));
}

#[tokio::test]
async fn test_thin_context_is_refused_without_calling_the_model() {
    let env = indexed_env().await;
    let answerer = Arc::new(RecordingAnswerer::default());
    let p = pipeline(
        &env,
        RerankStage::disabled(),
        answerer.clone(),
        params(1_000_000, false),
    );

    let answer = p.answer("How do I reset my password?").await.unwrap();
    assert_eq!(answer.outcome, Outcome::InsufficientContext);
    assert_eq!(answer.text, REFUSAL_MESSAGE);
    assert!(answer.citations.is_empty());
    assert!(answerer.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failing_reranker_keeps_retrieval_order() {
    let env = indexed_env().await;
    let plain = pipeline(
        &env,
        RerankStage::disabled(),
        Arc::new(RecordingAnswerer::default()),
        params(10, false),
    );
    let broken = pipeline(
        &env,
        RerankStage::new(Some(Arc::new(FailingReranker))),
        Arc::new(RecordingAnswerer::default()),
        params(10, true),
    );

    let a = plain.retrieve("password reset link").await.unwrap();
    let b = broken.retrieve("password reset link").await.unwrap();
    assert_eq!(a.context, b.context);
    assert!(b.stages.contains(&QueryStage::Reranked));
}

#[tokio::test]
async fn test_retrieve_respects_top_k_and_cap() {
    let env = indexed_env().await;
    let mut p = params(10, false);
    p.top_k = 2;
    p.per_source_cap = 1;
    let pipeline = pipeline(
        &env,
        RerankStage::disabled(),
        Arc::new(RecordingAnswerer::default()),
        p,
    );

    let r = pipeline.retrieve("documents").await.unwrap();
    assert_eq!(r.chunks.len(), 2);
    let sources: Vec<_> = r.chunks.iter().map(|c| c.chunk.source()).collect();
    assert_ne!(sources[0], sources[1]);
}
