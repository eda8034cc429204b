//! Text hygiene, recursive splitting, and chunk provenance.
//!
//! Ingestion produces one [`Chunk`] per retrieval unit. Loaders hand over
//! passages (a Markdown section, a JSON record) whose metadata already
//! names the `source` and a base `start_index`; this module splits them,
//! drops fragments that are too small to be useful, and stamps every
//! surviving chunk with a deterministic identity:
//!
//! ```text
//! chunk_id = sha256(source) ":" i "/" n      (i is 1-based, n per source)
//! ```
//!
//! Chunk content always starts with a passage marker and a context label
//! so the embedding sees the breadcrumb along with the text:
//!
//! ```text
//! passage: [CTX] Install > Linux
//! Run the installer with ...
//! ```
//!
//! # Splitting
//!
//! [`split_text`] is a recursive character splitter. It tries the
//! separators in [`SEPARATORS`] in order, keeping each separator at the
//! start of the piece that follows it, recursing into pieces that are
//! still too long, and merging small pieces back together up to
//! `chunk_size` characters with `chunk_overlap` characters carried over.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::models::Chunk;

/// Separators tried in order; code fences and headers first, characters last.
pub const SEPARATORS: &[&str] = &["\n```", "\n# ", "\n## ", "\n### ", "\n- ", "\n", " ", ""];

/// Marker prepended to every stored passage.
pub const PASSAGE_PREFIX: &str = "passage:";

/// Splitter parameters, in characters.
#[derive(Debug, Clone, Copy)]
pub struct SplitConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Pieces shorter than this are dropped by [`assign_provenance`].
    pub min_chars: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            min_chars: 120,
        }
    }
}

/// A piece of text and its character offset within the input.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub start_index: Option<usize>,
    pub text: String,
}

/// Normalize Unicode (NFC) and whitespace without touching single newlines.
///
/// Runs of spaces and tabs collapse to one space, three or more newlines
/// collapse to a blank line, and the result is trimmed.
pub fn clean_text(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let normalized: String = s.nfc().collect();

    let mut out = String::with_capacity(normalized.len());
    let mut in_blank_run = false;
    let mut newlines = 0usize;
    for c in normalized.chars() {
        match c {
            ' ' | '\t' => {
                if newlines > 0 {
                    flush_newlines(&mut out, newlines);
                    newlines = 0;
                }
                if !in_blank_run {
                    out.push(' ');
                    in_blank_run = true;
                }
            }
            '\n' => {
                in_blank_run = false;
                newlines += 1;
            }
            _ => {
                if newlines > 0 {
                    flush_newlines(&mut out, newlines);
                    newlines = 0;
                }
                in_blank_run = false;
                out.push(c);
            }
        }
    }
    out.trim().to_string()
}

fn flush_newlines(out: &mut String, count: usize) {
    for _ in 0..count.min(2) {
        out.push('\n');
    }
}

/// Prepend `passage: [CTX] <label>` unless the content already carries a marker.
pub fn ensure_passage_prefix(content: &str, label: &str) -> String {
    let head = content.trim_start().to_lowercase();
    if head.starts_with(PASSAGE_PREFIX) {
        content.to_string()
    } else {
        format!("{} [CTX] {}\n{}", PASSAGE_PREFIX, label, content)
    }
}

/// Hex SHA-256 of a source path, used as the per-source document id.
pub fn doc_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Split `text` into overlapping pieces of at most `chunk_size` characters.
///
/// Each piece is trimmed and carries its character offset within `text`
/// (`None` only if the piece could not be located, which cannot happen for
/// pieces taken verbatim from the input).
pub fn split_text(text: &str, config: &SplitConfig) -> Vec<TextSpan> {
    let pieces = split_recursive(text, SEPARATORS, config);

    let mut spans = Vec::with_capacity(pieces.len());
    let mut index: usize = 0;
    let mut previous_len: usize = 0;
    for piece in pieces {
        let offset = (index + previous_len).saturating_sub(config.chunk_overlap);
        let start = find_char_index(text, &piece, offset).or_else(|| find_char_index(text, &piece, 0));
        if let Some(s) = start {
            index = s;
        }
        previous_len = piece.chars().count();
        spans.push(TextSpan {
            start_index: start,
            text: piece,
        });
    }
    spans
}

fn split_recursive(text: &str, separators: &[&str], config: &SplitConfig) -> Vec<String> {
    let mut separator = "";
    let mut rest: &[&str] = &[];
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            separator = sep;
            break;
        }
        if text.contains(sep) {
            separator = sep;
            rest = &separators[i + 1..];
            break;
        }
    }

    let mut out = Vec::new();
    let mut good: Vec<String> = Vec::new();
    for piece in split_keep_separator(text, separator) {
        if piece.chars().count() < config.chunk_size {
            good.push(piece);
            continue;
        }
        if !good.is_empty() {
            out.extend(merge_pieces(&good, config));
            good.clear();
        }
        if rest.is_empty() {
            out.push(piece);
        } else {
            out.extend(split_recursive(&piece, rest, config));
        }
    }
    if !good.is_empty() {
        out.extend(merge_pieces(&good, config));
    }
    out
}

/// Split on `separator`, keeping it at the start of the following piece.
fn split_keep_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut pieces = Vec::new();
    let mut last = 0;
    for (pos, _) in text.match_indices(separator) {
        if pos > last {
            pieces.push(text[last..pos].to_string());
        }
        last = pos;
    }
    if last < text.len() {
        pieces.push(text[last..].to_string());
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

/// Greedily join small pieces up to `chunk_size`, carrying `chunk_overlap`.
fn merge_pieces(pieces: &[String], config: &SplitConfig) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current: VecDeque<(&str, usize)> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = piece.chars().count();
        if total + len > config.chunk_size && !current.is_empty() {
            push_joined(&mut docs, &current);
            while total > config.chunk_overlap || (total + len > config.chunk_size && total > 0) {
                match current.pop_front() {
                    Some((_, l)) => total -= l,
                    None => break,
                }
            }
        }
        current.push_back((piece.as_str(), len));
        total += len;
    }
    push_joined(&mut docs, &current);
    docs
}

fn push_joined(docs: &mut Vec<String>, current: &VecDeque<(&str, usize)>) {
    let joined: String = current.iter().map(|(s, _)| *s).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

/// Find `needle` in `haystack` at or after character offset `from`,
/// returning a character offset.
fn find_char_index(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let byte_from = haystack
        .char_indices()
        .nth(from)
        .map(|(i, _)| i)
        .unwrap_or(haystack.len());
    haystack[byte_from..]
        .find(needle)
        .map(|b| haystack[..byte_from + b].chars().count())
}

/// Stamp chunk identity and sequence metadata, grouped per source.
///
/// - Drops chunks whose content is shorter than `min_chars`.
/// - Groups by `source` in first-seen order and orders each group by
///   `start_index` (stable, missing offsets first).
/// - Assigns `doc_id`, `chunk_id = "<doc_id>:<i>/<n>"`, `chunk_index`
///   and `n_chunks`.
/// - Re-cleans content and guarantees the passage prefix, labelled with
///   the section path, JSON path, title, or file name.
pub fn assign_provenance(chunks: Vec<Chunk>, min_chars: usize) -> Vec<Chunk> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<Chunk>> = HashMap::new();

    for chunk in chunks {
        if chunk.content.chars().count() < min_chars {
            continue;
        }
        let source = chunk.source().unwrap_or("unknown").to_string();
        groups
            .entry(source.clone())
            .or_insert_with(|| {
                order.push(source);
                Vec::new()
            })
            .push(chunk);
    }

    let mut out = Vec::new();
    for source in order {
        let Some(mut group) = groups.remove(&source) else {
            continue;
        };
        group.sort_by_key(|c| c.metadata.start_index.unwrap_or(-1));

        let did = doc_hash(&source);
        let n = group.len();
        let file_label = Path::new(&source)
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| source.clone());

        for (i, mut chunk) in group.into_iter().enumerate() {
            chunk.metadata.doc_id = Some(did.clone());
            chunk.metadata.chunk_id = Some(format!("{}:{}/{}", did, i + 1, n));
            chunk.metadata.chunk_index = Some(i as i64);
            chunk.metadata.n_chunks = Some(n as i64);

            let label = chunk
                .metadata
                .breadcrumb()
                .or(chunk.metadata.title.as_deref().filter(|t| !t.is_empty()))
                .map(str::to_string)
                .unwrap_or_else(|| file_label.clone());
            chunk.content = ensure_passage_prefix(&clean_text(&chunk.content), &label);
            out.push(chunk);
        }
    }
    out
}
