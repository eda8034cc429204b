//! Hard failures of the query path.
//!
//! Only collaborator failures that make an answer impossible surface here.
//! Reranker failures are absorbed by [`RerankStage`](crate::rerank::RerankStage)
//! and insufficient context is an [`Outcome`](crate::pipeline::Outcome),
//! not an error.

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("retrieval failed: {0:#}")]
    Retrieval(anyhow::Error),

    #[error("answer generation failed: {0:#}")]
    Generation(anyhow::Error),
}
