//! Markdown and JSON loaders.
//!
//! A loader turns one file into a list of [`SourceDoc`] passages: a
//! Markdown section, a JSON record, or a single JSON leaf. Passages carry
//! their provenance in [`ChunkMetadata`] and a base `start_index`, which
//! is the passage's character offset in the file's passages joined by a
//! blank line. Splitting adds the in-passage offset on top of it.
//!
//! [`scan_files`] walks the data directory with include/exclude globs the
//! same way for every ingest run, sorted for deterministic chunk ids.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use grounded_core::chunk::clean_text;
use grounded_core::models::ChunkMetadata;

use crate::config::IngestConfig;

/// Fields checked, in order, for the primary text of a JSON object.
pub const TEXT_CANDIDATE_FIELDS: &[&str] = &[
    "content",
    "text",
    "body",
    "message",
    "description",
    "summary",
    "markdown",
];

/// Breadcrumb for Markdown text before the first header.
pub const ROOT_SECTION: &str = "ROOT";

/// Length of the separator assumed between passages when computing offsets.
const PASSAGE_GAP: usize = 2;

/// A loaded passage, before splitting.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDoc {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A file selected for ingestion.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// Path relative to the data directory, used as the chunk `source`.
    pub relative: String,
}

pub fn scan_files(config: &IngestConfig) -> Result<Vec<ScannedFile>> {
    let root = &config.data_dir;
    if !root.exists() {
        bail!(
            "Data directory does not exist: {} (add your .md/.json files there)",
            root.display()
        );
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(ScannedFile {
            path: path.to_path_buf(),
            relative: rel_str,
        });
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Load one file, dispatching on its extension. Unreadable files and
/// unsupported extensions are skipped with a warning.
pub fn load_file(file: &ScannedFile, config: &IngestConfig) -> Vec<SourceDoc> {
    let raw = match std::fs::read_to_string(&file.path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %file.path.display(), "failed to read file, skipping: {}", e);
            return Vec::new();
        }
    };
    let domain = config.domain.as_deref();

    match extension(&file.path).as_deref() {
        Some("md") | Some("markdown") => load_markdown(&file.relative, &raw, domain),
        Some("json") => load_json(&file.relative, &raw, domain, config.json_leaf_passages),
        _ => {
            warn!(path = %file.path.display(), "unsupported file type, skipping");
            Vec::new()
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}

// ============ Markdown ============

/// Split a Markdown document on level 1 to 3 headings.
///
/// Each non-empty section becomes one passage whose `section_path` is the
/// `h1 > h2 > h3` breadcrumb in effect, or [`ROOT_SECTION`]. Heading lines
/// are not part of the section body. Deeper headings, and anything that
/// only looks like a heading inside a code block, stay in the body.
pub fn load_markdown(source: &str, raw: &str, domain: Option<&str>) -> Vec<SourceDoc> {
    let docs = markdown_sections(raw)
        .into_iter()
        .filter_map(|(section_path, body)| {
            let text = clean_text(&body);
            if text.is_empty() {
                return None;
            }
            let mut metadata = base_metadata(source, "markdown", domain);
            metadata.section_path = Some(section_path);
            Some(SourceDoc { text, metadata })
        })
        .collect();
    with_offsets(docs)
}

/// Section bodies are byte slices of `raw` between top-level headings, so
/// the body keeps its original Markdown.
fn markdown_sections(raw: &str) -> Vec<(String, String)> {
    let mut sections = Vec::new();
    let mut headers: [Option<String>; 3] = [None, None, None];
    let mut body_start = 0usize;
    // Level and collected text of the heading being read.
    let mut heading: Option<(usize, String)> = None;

    for (event, range) in Parser::new_ext(raw, Options::empty()).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. })
                if (level as usize) <= 3 && starts_line(raw, range.start) =>
            {
                flush_section(&mut sections, &headers, &raw[body_start..range.start]);
                heading = Some((level as usize, String::new()));
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, title)) = heading.as_mut() {
                    title.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, title)) = heading.take() {
                    headers[level - 1] = Some(title.trim().to_string());
                    for deeper in headers.iter_mut().skip(level) {
                        *deeper = None;
                    }
                    body_start = range.end;
                }
            }
            _ => {}
        }
    }
    flush_section(&mut sections, &headers, &raw[body_start..]);
    sections
}

/// True when only indentation precedes `offset` on its line. Headings
/// nested in block quotes or list items do not start a section.
fn starts_line(raw: &str, offset: usize) -> bool {
    let line_start = raw[..offset].rfind('\n').map_or(0, |i| i + 1);
    raw[line_start..offset].trim().is_empty()
}

fn flush_section(sections: &mut Vec<(String, String)>, headers: &[Option<String>; 3], body: &str) {
    if body.trim().is_empty() {
        return;
    }
    let path = headers
        .iter()
        .flatten()
        .filter(|h| !h.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" > ");
    let path = if path.is_empty() {
        ROOT_SECTION.to_string()
    } else {
        path
    };
    sections.push((path, body.to_string()));
}

// ============ JSON ============

/// Turn a JSON document into passages.
///
/// - Array: one primary passage per object item (see [`pick_text_field`]),
///   plus one `"<path>: <value>"` passage per scalar leaf when
///   `leaf_passages` is set. Non-object items become their rendering.
/// - Object: a single primary passage.
/// - Primitive: its rendering.
///
/// Malformed JSON is logged and yields no passages.
pub fn load_json(
    source: &str,
    raw: &str,
    domain: Option<&str>,
    leaf_passages: bool,
) -> Vec<SourceDoc> {
    let data: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(source, "failed to parse JSON, skipping: {}", e);
            return Vec::new();
        }
    };

    let mk = |text: String, metadata: ChunkMetadata| SourceDoc {
        text: clean_text(&text),
        metadata,
    };

    let mut docs = Vec::new();
    match &data {
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                let mut meta = base_metadata(source, "json", domain);
                meta.set_extra("json_index", &Value::from(idx));

                let Value::Object(obj) = item else {
                    docs.push(mk(render_scalar(item), meta));
                    continue;
                };

                let title = obj.get("title").map(render_scalar);
                let (text, rest) = pick_text_field(obj);
                let mut primary = meta.clone();
                primary.title = title.clone();
                for (k, v) in rest.iter().filter(|(k, _)| k.as_str() != "title") {
                    primary.set_extra(k.clone(), v);
                }
                docs.push(mk(text, primary));

                if leaf_passages {
                    for (path, value) in json_leaves(item) {
                        let mut leaf = meta.clone();
                        leaf.title = title.clone();
                        leaf.json_path = Some(path.clone());
                        docs.push(mk(format!("{}: {}", path, render_scalar(value)), leaf));
                    }
                }
            }
        }
        Value::Object(obj) => {
            let (text, rest) = pick_text_field(obj);
            let mut meta = base_metadata(source, "json", domain);
            meta.title = obj.get("title").map(render_scalar);
            for (k, v) in rest.iter().filter(|(k, _)| k.as_str() != "title") {
                meta.set_extra(k.clone(), v);
            }
            docs.push(mk(text, meta));
        }
        other => docs.push(mk(render_scalar(other), base_metadata(source, "json", domain))),
    }

    docs.retain(|d| !d.text.is_empty());
    with_offsets(docs)
}

/// Choose the primary text of a JSON object.
///
/// Returns the first of [`TEXT_CANDIDATE_FIELDS`] holding a string or
/// number, with the remaining fields. Without one, builds a narrative of
/// `path: value` lines from the scalar leaves, or falls back to compact
/// JSON; the remaining-fields map is then empty.
pub fn pick_text_field(obj: &Map<String, Value>) -> (String, Map<String, Value>) {
    for &key in TEXT_CANDIDATE_FIELDS {
        if let Some(v) = obj.get(key).filter(|v| v.is_string() || v.is_number()) {
            let rest = obj
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            return (render_scalar(v), rest);
        }
    }

    let value = Value::Object(obj.clone());
    let lines: Vec<String> = json_leaves(&value)
        .into_iter()
        .filter(|(_, v)| !matches!(v, Value::String(s) if s.is_empty()))
        .map(|(path, v)| format!("{}: {}", pretty_path(&path), render_scalar(v)))
        .collect();
    if !lines.is_empty() {
        return (lines.join("\n"), Map::new());
    }

    (value.to_string(), Map::new())
}

/// All scalar leaves with their paths (`a.b[0].c`). Nulls are skipped.
pub fn json_leaves(value: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    walk(value, String::new(), &mut out);
    out
}

fn walk<'a>(value: &'a Value, path: String, out: &mut Vec<(String, &'a Value)>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let p = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", path, k)
                };
                walk(v, p, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                walk(v, format!("{}[{}]", path, i), out);
            }
        }
        Value::Null => {}
        _ => out.push((path, value)),
    }
}

fn pretty_path(path: &str) -> String {
    path.replace('.', " › ").replace('[', " [").replace(']', " ]")
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============ Shared ============

fn base_metadata(source: &str, doc_type: &str, domain: Option<&str>) -> ChunkMetadata {
    let mut meta = ChunkMetadata {
        source: Some(source.to_string()),
        doc_type: Some(doc_type.to_string()),
        ..Default::default()
    };
    if let Some(domain) = domain {
        meta.set_extra("domain", &Value::from(domain));
    }
    meta
}

/// Assign each passage its offset in the passages joined by a blank line.
fn with_offsets(mut docs: Vec<SourceDoc>) -> Vec<SourceDoc> {
    let mut offset = 0usize;
    for doc in &mut docs {
        doc.metadata.start_index = Some(offset as i64);
        offset += doc.text.chars().count() + PASSAGE_GAP;
    }
    docs
}
