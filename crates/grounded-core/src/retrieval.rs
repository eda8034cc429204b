//! Candidate filtering and source-diversity selection.
//!
//! Both stages operate on plain [`ScoredChunk`] lists with no store or
//! configuration dependencies, so they can be exercised with synthetic
//! candidates.
//!
//! # Diversity selection
//!
//! 1. Stable-sort candidates by score, descending (absent scores sort as 0).
//! 2. Walk the sorted list, skipping chunk ids already selected and
//!    sources that already contributed `per_source_cap` chunks.
//! 3. Stop at `top_k`.
//! 4. If fewer than `top_k` were picked, walk the sorted list again and
//!    backfill any unselected id, ignoring the per-source cap.
//!
//! The backfill pass can re-admit chunks the cap rejected. That trades
//! redundancy for a full context when the candidate pool is dominated by
//! one source.

use std::collections::{HashMap, HashSet};

use crate::models::ScoredChunk;

/// Keep candidates whose score is absent or at least `threshold`.
pub fn filter_by_score(candidates: Vec<ScoredChunk>, threshold: f32) -> Vec<ScoredChunk> {
    candidates
        .into_iter()
        .filter(|c| c.score.map_or(true, |s| s >= threshold))
        .collect()
}

/// Pick up to `top_k` candidates, at most `per_source_cap` per source
/// before backfill.
///
/// Returns the selection in pick order: capped picks first (by score),
/// then backfilled picks (by score).
pub fn select_diverse(
    candidates: &[ScoredChunk],
    top_k: usize,
    per_source_cap: usize,
) -> Vec<ScoredChunk> {
    if top_k == 0 || candidates.is_empty() {
        return Vec::new();
    }

    let mut ranked: Vec<&ScoredChunk> = candidates.iter().collect();
    // `sort_by` is stable: equal scores keep their input order.
    ranked.sort_by(|a, b| {
        b.sort_score()
            .partial_cmp(&a.sort_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut selected: Vec<ScoredChunk> = Vec::with_capacity(top_k);
    let mut seen: HashSet<String> = HashSet::new();
    let mut per_source: HashMap<Option<&str>, usize> = HashMap::new();

    for cand in &ranked {
        if selected.len() >= top_k {
            break;
        }
        let key = cand.chunk.dedup_key();
        if seen.contains(&key) {
            continue;
        }
        let count = per_source.entry(cand.chunk.source()).or_insert(0);
        if *count >= per_source_cap {
            continue;
        }
        *count += 1;
        seen.insert(key);
        selected.push((*cand).clone());
    }

    if selected.len() < top_k {
        for cand in &ranked {
            if selected.len() >= top_k {
                break;
            }
            if seen.insert(cand.chunk.dedup_key()) {
                selected.push((*cand).clone());
            }
        }
    }

    selected
}
