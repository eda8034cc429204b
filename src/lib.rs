//! # Grounded
//!
//! Retrieval-augmented answering over local Markdown and JSON corpora.
//!
//! Grounded ingests a directory of documents into a SQLite vector index
//! and answers questions from it. Every answer is built only from
//! retrieved passages and cites the files they came from; when too little
//! relevant text is found it says so instead of guessing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │   Loaders   │──▶│ Split+Embed  │──▶│  SQLite  │
//! │  MD / JSON  │   │  provenance  │   │ vectors  │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!                                           │
//!                                           ▼
//!                  ┌──────────────────────────────────┐
//!                  │ QueryPipeline (grounded-core)    │
//!                  │ filter ▸ diversity ▸ rerank ▸    │
//!                  │ context ▸ gate ▸ LLM             │
//!                  └──────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! grounded init                     # create database
//! grounded ingest                   # index ./dataset/refined
//! grounded ask "How do I reset my password?"
//! grounded chat                     # interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration, env overrides, validation |
//! | [`loader`] | Markdown and JSON loaders, file scanning |
//! | [`ingest`] | Full reindex: load, split, embed, store |
//! | [`sqlite_store`] | SQLite [`ChunkStore`](grounded_core::store::ChunkStore) |
//! | [`embedding`] | Embedding providers |
//! | [`rerank`] | Local cross-encoder reranker |
//! | [`model_slot`] | Load-once holder for local models |
//! | [`llm`] | Chat-model answerers |
//! | [`ask`] | `ask`, `retrieve` and `chat` commands |
//! | [`stats`] | Index statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod ask;
pub mod config;
pub mod db;
pub mod embedding;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod model_slot;
pub mod rerank;
pub mod sqlite_store;
pub mod stats;
