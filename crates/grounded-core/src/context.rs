//! Rendering selected chunks into a grounded context block.
//!
//! Each chunk is emitted as a header line followed by its content:
//!
//! ```text
//! [1] source: docs/install.md | chunk: 3f2a…:2/5 | path: Install > Linux
//! passage: [CTX] Install > Linux
//! Run the installer with ...
//! ```
//!
//! Blocks are joined with [`SEPARATOR`]. Missing metadata never blocks
//! assembly: the chunk id falls back to `@<start_index>`, then `?`, and a
//! missing breadcrumb renders as an empty string.

use std::collections::HashSet;

use serde::Serialize;

use crate::models::ScoredChunk;

/// Separator placed between rendered chunk blocks.
pub const SEPARATOR: &str = "\n\n---\n\n";

/// Placeholder for missing identifiers.
const UNKNOWN: &str = "?";

/// An assembled context, built fresh for each query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Context {
    /// Header + content blocks joined by [`SEPARATOR`].
    pub text: String,
    /// Unique sources in first-seen order.
    pub citations: Vec<String>,
}

impl Context {
    /// Length of the rendered text in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Render the header line for the chunk at 1-based `position`.
pub fn chunk_header(position: usize, chunk: &ScoredChunk) -> String {
    let meta = &chunk.chunk.metadata;
    let source = meta.source.as_deref().unwrap_or(UNKNOWN);
    let id = match (&meta.chunk_id, meta.start_index) {
        (Some(id), _) => id.clone(),
        (None, Some(start)) => format!("@{}", start),
        (None, None) => UNKNOWN.to_string(),
    };
    let path = meta.breadcrumb().unwrap_or("");
    format!("[{}] source: {} | chunk: {} | path: {}", position, source, id, path)
}

/// Render `chunks`, in the given order, into a [`Context`].
pub fn assemble_context(chunks: &[ScoredChunk]) -> Context {
    let text = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}\n{}", chunk_header(i + 1, c), c.chunk.content))
        .collect::<Vec<_>>()
        .join(SEPARATOR);

    Context {
        text,
        citations: collect_citations(chunks),
    }
}

/// Unique `source` values in first-seen order. Chunks without a source
/// are not cited.
pub fn collect_citations(chunks: &[ScoredChunk]) -> Vec<String> {
    let mut seen = HashSet::new();
    chunks
        .iter()
        .filter_map(|c| c.chunk.source())
        .filter(|s| seen.insert(*s))
        .map(str::to_string)
        .collect()
}
