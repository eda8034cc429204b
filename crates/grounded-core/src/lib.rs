//! # Grounded Core
//!
//! Runtime-agnostic logic for Grounded: the chunk data model, splitting
//! and provenance, the collaborator traits (store, embedder, reranker,
//! answerer), and the query pipeline that turns a question into a
//! grounded answer with citations.
//!
//! This crate contains no tokio, sqlx, HTTP or filesystem I/O. Concrete
//! collaborators live in the `grounded` application crate; tests use the
//! in-memory store and hand-written doubles.
//!
//! ## Query flow
//!
//! ```text
//! question ─▶ Embedder ─▶ ChunkStore ─▶ filter ─▶ diversity ─▶ rerank
//!                                                                │
//!   answer + citations ◀── Answerer ◀── gate ◀── context ◀───────┘
//! ```

pub mod answer;
pub mod chunk;
pub mod context;
pub mod embedding;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod rerank;
pub mod retrieval;
pub mod store;

pub use error::QueryError;
pub use models::{Chunk, ChunkMetadata, MetaValue, ScoredChunk};
pub use pipeline::{Answer, Outcome, PipelineParams, QueryPipeline, QueryStage};
