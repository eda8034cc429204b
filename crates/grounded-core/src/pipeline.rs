//! The query orchestrator.
//!
//! [`QueryPipeline`] drives one question through every stage:
//!
//! ```text
//! QueryReceived → Embedded → Retrieved → Filtered → Selected → Reranked
//!     → ContextBuilt → GateChecked → Answered | InsufficientContext
//! ```
//!
//! Transitions are one-way and each stage is awaited before the next
//! starts. The visited stages are returned with the [`Answer`] so callers
//! and tests can see exactly where a query stopped.
//!
//! Embedding, retrieval and generation failures abort the query with a
//! [`QueryError`]. Reranker failures are absorbed by [`RerankStage`]. A
//! thin context is not an error: the pipeline answers with
//! [`REFUSAL_MESSAGE`] and never calls the model.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::answer::{build_user_prompt, Answerer, SYSTEM_PROMPT};
use crate::context::{assemble_context, Context};
use crate::embedding::Embedder;
use crate::error::QueryError;
use crate::models::ScoredChunk;
use crate::rerank::RerankStage;
use crate::retrieval::{filter_by_score, select_diverse};
use crate::store::ChunkStore;

/// Answer returned when the retrieved context is too thin to ground on.
pub const REFUSAL_MESSAGE: &str =
    "I don't know based on the indexed documents: not enough relevant context was found.";

/// Prefix expected by asymmetric embedding models on the query side.
pub const QUERY_PREFIX: &str = "query: ";

/// A state of the query state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    QueryReceived,
    Embedded,
    Retrieved,
    Filtered,
    Selected,
    Reranked,
    ContextBuilt,
    GateChecked,
    Answered,
    InsufficientContext,
}

/// How a query ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Answered,
    InsufficientContext,
}

/// The result of [`QueryPipeline::answer`].
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    /// Empty when the outcome is [`Outcome::InsufficientContext`].
    pub citations: Vec<String>,
    pub outcome: Outcome,
    #[serde(skip)]
    pub stages: Vec<QueryStage>,
}

/// The result of [`QueryPipeline::retrieve`]: everything up to the gate.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub chunks: Vec<ScoredChunk>,
    pub context: Context,
    pub stages: Vec<QueryStage>,
}

/// Tuning knobs for the query path.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineParams {
    pub top_k: usize,
    pub fetch_k: usize,
    pub score_threshold: f32,
    pub min_context_chars: usize,
    pub use_reranker: bool,
    pub per_source_cap: usize,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            top_k: 6,
            fetch_k: 24,
            score_threshold: 0.18,
            min_context_chars: 600,
            use_reranker: true,
            per_source_cap: 2,
        }
    }
}

/// Prefix `query` with [`QUERY_PREFIX`] unless it already carries one.
pub fn ensure_query_prefix(query: &str) -> String {
    let trimmed = query.trim();
    let has_prefix = trimmed
        .get(..6)
        .map_or(false, |head| head.eq_ignore_ascii_case("query:"));
    if has_prefix {
        trimmed.to_string()
    } else {
        format!("{}{}", QUERY_PREFIX, trimmed)
    }
}

/// Wires the collaborators together. Holds no per-query state, so one
/// pipeline can be shared across concurrent callers.
pub struct QueryPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn ChunkStore>,
    reranker: RerankStage,
    answerer: Arc<dyn Answerer>,
    params: PipelineParams,
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn ChunkStore>,
        reranker: RerankStage,
        answerer: Arc<dyn Answerer>,
        params: PipelineParams,
    ) -> Self {
        Self {
            embedder,
            store,
            reranker,
            answerer,
            params,
        }
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    /// Run retrieval and context assembly without invoking the model.
    pub async fn retrieve(&self, question: &str) -> Result<Retrieval, QueryError> {
        let mut stages = vec![QueryStage::QueryReceived];

        let query = ensure_query_prefix(question);
        let query_vec = self
            .embedder
            .embed(&query)
            .await
            .map_err(QueryError::Embedding)?;
        stages.push(QueryStage::Embedded);
        debug!(dims = query_vec.len(), "embedded query");

        let candidates = self
            .store
            .search(&query_vec, self.params.fetch_k)
            .await
            .map_err(QueryError::Retrieval)?;
        stages.push(QueryStage::Retrieved);
        debug!(n = candidates.len(), fetch_k = self.params.fetch_k, "retrieved candidates");

        let kept = filter_by_score(candidates, self.params.score_threshold);
        stages.push(QueryStage::Filtered);
        debug!(n = kept.len(), threshold = self.params.score_threshold, "filtered candidates");

        let selected = select_diverse(&kept, self.params.top_k, self.params.per_source_cap);
        stages.push(QueryStage::Selected);
        debug!(n = selected.len(), top_k = self.params.top_k, "selected diverse chunks");

        // The cross-encoder sees the question as asked; the `query:` tag is
        // only meaningful to the embedding model.
        let chunks = if self.params.use_reranker {
            self.reranker.apply(question.trim(), selected).await
        } else {
            selected
        };
        stages.push(QueryStage::Reranked);

        let context = assemble_context(&chunks);
        stages.push(QueryStage::ContextBuilt);
        debug!(
            chars = context.char_len(),
            citations = context.citations.len(),
            "assembled context"
        );

        Ok(Retrieval {
            chunks,
            context,
            stages,
        })
    }

    /// Answer `question` from the indexed corpus.
    pub async fn answer(&self, question: &str) -> Result<Answer, QueryError> {
        if question.trim().is_empty() {
            debug!("empty question, refusing");
            return Ok(refusal(vec![
                QueryStage::QueryReceived,
                QueryStage::InsufficientContext,
            ]));
        }

        let Retrieval {
            chunks,
            context,
            mut stages,
        } = self.retrieve(question).await?;

        stages.push(QueryStage::GateChecked);
        let chars = context.char_len();
        if chunks.is_empty() || chars < self.params.min_context_chars {
            debug!(
                chars,
                min = self.params.min_context_chars,
                "context below minimum, refusing"
            );
            stages.push(QueryStage::InsufficientContext);
            return Ok(refusal(stages));
        }

        let user = build_user_prompt(question.trim(), &context.text);
        let text = self
            .answerer
            .generate(SYSTEM_PROMPT, &user)
            .await
            .map_err(QueryError::Generation)?;
        stages.push(QueryStage::Answered);
        debug!(model = self.answerer.model_name(), "generated answer");

        Ok(Answer {
            text,
            citations: context.citations,
            outcome: Outcome::Answered,
            stages,
        })
    }
}

fn refusal(stages: Vec<QueryStage>) -> Answer {
    Answer {
        text: REFUSAL_MESSAGE.to_string(),
        citations: Vec::new(),
        outcome: Outcome::InsufficientContext,
        stages,
    }
}
