//! Best-effort cross-encoder reranking.
//!
//! A [`Reranker`] scores `(query, passage)` pairs directly instead of
//! comparing embeddings. It is optional: the model may be disabled,
//! missing, or fail to load, and it may fail at call time. [`RerankStage`]
//! resolves availability once at construction and treats every failure
//! mode the same way, by returning its input unchanged.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::models::ScoredChunk;

/// Cross-encoder scoring capability.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Score each passage against `query`. Returns one score per passage,
    /// in passage order, higher is more relevant.
    async fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;
}

/// The reranking stage of the query pipeline.
#[derive(Clone, Default)]
pub struct RerankStage {
    reranker: Option<Arc<dyn Reranker>>,
}

impl RerankStage {
    pub fn new(reranker: Option<Arc<dyn Reranker>>) -> Self {
        Self { reranker }
    }

    pub fn disabled() -> Self {
        Self { reranker: None }
    }

    pub fn is_available(&self) -> bool {
        self.reranker.is_some()
    }

    /// Re-score and re-sort `chunks` against `query`.
    ///
    /// Never changes the number of chunks. Any failure, including a score
    /// count that does not match the passage count, leaves the input as it
    /// was.
    pub async fn apply(&self, query: &str, chunks: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        let Some(reranker) = &self.reranker else {
            return chunks;
        };
        if chunks.is_empty() {
            return chunks;
        }

        let passages: Vec<&str> = chunks.iter().map(|c| c.chunk.content.as_str()).collect();
        let scores = match reranker.score(query, &passages).await {
            Ok(scores) if scores.len() == chunks.len() => scores,
            Ok(scores) => {
                warn!(
                    model = reranker.model_name(),
                    expected = chunks.len(),
                    got = scores.len(),
                    "reranker returned wrong number of scores, keeping retrieval order"
                );
                return chunks;
            }
            Err(e) => {
                warn!(model = reranker.model_name(), "reranker failed, keeping retrieval order: {:#}", e);
                return chunks;
            }
        };

        let mut reranked: Vec<ScoredChunk> = chunks
            .into_iter()
            .zip(scores)
            .map(|(mut c, s)| {
                c.score = Some(s);
                c
            })
            .collect();
        reranked.sort_by(|a, b| {
            b.sort_score()
                .partial_cmp(&a.sort_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        debug!(model = reranker.model_name(), n = reranked.len(), "reranked candidates");
        reranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ChunkMetadata};
    use anyhow::bail;

    fn cand(id: &str, score: f32) -> ScoredChunk {
        ScoredChunk::new(
            Chunk::new(
                format!("passage {}", id),
                ChunkMetadata {
                    chunk_id: Some(id.to_string()),
                    ..Default::default()
                },
            ),
            Some(score),
        )
    }

    /// Scores passages by their position from the end: reverses the order.
    struct ReverseReranker;

    #[async_trait]
    impl Reranker for ReverseReranker {
        fn model_name(&self) -> &str {
            "reverse"
        }
        async fn score(&self, _query: &str, passages: &[&str]) -> Result<Vec<f32>> {
            Ok((0..passages.len()).map(|i| i as f32 / 10.0).collect())
        }
    }

    struct FailingReranker;

    #[async_trait]
    impl Reranker for FailingReranker {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn score(&self, _query: &str, _passages: &[&str]) -> Result<Vec<f32>> {
            bail!("model crashed")
        }
    }

    struct ShortReranker;

    #[async_trait]
    impl Reranker for ShortReranker {
        fn model_name(&self) -> &str {
            "short"
        }
        async fn score(&self, _query: &str, _passages: &[&str]) -> Result<Vec<f32>> {
            Ok(vec![0.5])
        }
    }

    fn input() -> Vec<ScoredChunk> {
        vec![cand("a", 0.9), cand("b", 0.6), cand("c", 0.3)]
    }

    #[tokio::test]
    async fn test_rerank_replaces_scores_and_resorts() {
        let stage = RerankStage::new(Some(Arc::new(ReverseReranker)));
        assert!(stage.is_available());
        let out = stage.apply("q", input()).await;
        let ids: Vec<_> = out.iter().map(|c| c.chunk.metadata.chunk_id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(out[0].score, Some(0.2));
        assert_eq!(out.len(), 3);
    }

    #[tokio::test]
    async fn test_rerank_failure_is_passthrough() {
        let stage = RerankStage::new(Some(Arc::new(FailingReranker)));
        assert_eq!(stage.apply("q", input()).await, input());
    }

    #[tokio::test]
    async fn test_rerank_wrong_length_is_passthrough() {
        let stage = RerankStage::new(Some(Arc::new(ShortReranker)));
        assert_eq!(stage.apply("q", input()).await, input());
    }

    #[tokio::test]
    async fn test_rerank_unavailable_is_passthrough() {
        let stage = RerankStage::disabled();
        assert!(!stage.is_available());
        assert_eq!(stage.apply("q", input()).await, input());
    }
}
