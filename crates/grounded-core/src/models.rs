//! Core data models used throughout Grounded.
//!
//! These types represent the chunks that flow from ingestion into the
//! store, and the scored candidates that flow through the query pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A flat metadata scalar.
///
/// Vector indexes only accept scalar metadata, so structured values are
/// serialized to a JSON string before they reach a [`ChunkMetadata`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetaValue {
    /// Convert an arbitrary JSON value into a scalar.
    ///
    /// `null` maps to `None`; arrays and objects become their compact JSON
    /// rendering.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(0.0)),
            }),
            serde_json::Value::String(s) => Some(Self::Str(s.clone())),
            other => Some(Self::Str(other.to_string())),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetaValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => f.write_str(s),
        }
    }
}

/// Provenance metadata attached to every chunk.
///
/// Only the named fields are ever read by the retrieval core. Anything
/// else a loader wants to keep goes into `extra`, which round-trips
/// through storage untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Origin path or identifier. Not unique: one source yields many chunks.
    pub source: Option<String>,
    /// `"markdown"` or `"json"`.
    pub doc_type: Option<String>,
    /// Markdown header breadcrumb (`"Intro > Setup"`).
    pub section_path: Option<String>,
    /// JSON leaf path (`"items[0].name"`).
    pub json_path: Option<String>,
    pub title: Option<String>,
    /// SHA-256 of the source path.
    pub doc_id: Option<String>,
    /// `"<doc_id>:<i>/<n>"`, 1-based.
    pub chunk_id: Option<String>,
    /// 0-based position within the source's chunk sequence.
    pub chunk_index: Option<i64>,
    pub n_chunks: Option<i64>,
    /// Character offset within the reassembled source document.
    pub start_index: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, MetaValue>,
}

impl ChunkMetadata {
    /// Human-readable breadcrumb for citation display.
    pub fn breadcrumb(&self) -> Option<&str> {
        self.section_path
            .as_deref()
            .or(self.json_path.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Insert a JSON value into `extra`, flattening it to a scalar.
    pub fn set_extra(&mut self, key: impl Into<String>, value: &serde_json::Value) {
        if let Some(v) = MetaValue::from_json(value) {
            self.extra.insert(key.into(), v);
        }
    }
}

/// A retrieval unit: cleaned text plus provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(content: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.source.as_deref()
    }

    /// Identity used for de-duplication across fetches.
    ///
    /// The stored chunk id when present, otherwise a SHA-256 of the content
    /// so two copies of the same anonymous text still collapse.
    pub fn dedup_key(&self) -> String {
        match &self.metadata.chunk_id {
            Some(id) => id.clone(),
            None => {
                let mut hasher = Sha256::new();
                hasher.update(self.content.as_bytes());
                format!("content:{:x}", hasher.finalize())
            }
        }
    }
}

/// A chunk paired with its relevance score.
///
/// Scores are in `[0, 1]`, higher is more relevant. A store that cannot
/// compute a score returns `None`, and the chunk passes every threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: Option<f32>,
}

impl ScoredChunk {
    pub fn new(chunk: Chunk, score: Option<f32>) -> Self {
        Self { chunk, score }
    }

    /// Score used for ordering only; absent scores sort as `0.0`.
    pub fn sort_score(&self) -> f32 {
        self.score.unwrap_or(0.0)
    }
}
