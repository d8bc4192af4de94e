// src/analyze/rank.rs
//! Deterministic ranking and near-duplicate suppression.
//!
//! Order: score desc, then raw tie-break metric desc, then earlier `created_at`,
//! then id asc. Any permutation of the same batch ranks identically.
//!
//! Near-duplicates: titles compared with `strsim::normalized_levenshtein`; the
//! lower-ranked of two similar titles is dropped.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use strsim::normalized_levenshtein;

use crate::candidate::ScoredCandidate;

/// Sort included candidates best-first. Excluded candidates are discarded.
pub fn rank(
    items: Vec<ScoredCandidate>,
    tiebreak_metric: &str,
    now: DateTime<Utc>,
) -> Vec<ScoredCandidate> {
    let mut kept: Vec<ScoredCandidate> = items.into_iter().filter(|s| s.included).collect();
    kept.sort_by(|a, b| compare(a, b, tiebreak_metric, now));
    kept
}

fn compare(
    a: &ScoredCandidate,
    b: &ScoredCandidate,
    tiebreak_metric: &str,
    now: DateTime<Utc>,
) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| {
            b.candidate
                .metric(tiebreak_metric)
                .total_cmp(&a.candidate.metric(tiebreak_metric))
        })
        .then_with(|| {
            a.candidate
                .effective_created_at(now)
                .cmp(&b.candidate.effective_created_at(now))
        })
        .then_with(|| a.candidate.id.cmp(&b.candidate.id))
}

/// Drop candidates whose title is at least `threshold` similar to a better-ranked one.
/// Returns the survivors (order preserved) and how many were dropped.
pub fn suppress_similar_titles(
    ranked: Vec<ScoredCandidate>,
    threshold: f64,
) -> (Vec<ScoredCandidate>, usize) {
    let mut kept: Vec<ScoredCandidate> = Vec::with_capacity(ranked.len());
    let mut kept_titles: Vec<String> = Vec::with_capacity(ranked.len());
    let mut dropped = 0usize;

    for item in ranked {
        let title = normalize_title(item.candidate.title());
        if !title.is_empty()
            && kept_titles
                .iter()
                .any(|t| normalized_levenshtein(t, &title) >= threshold)
        {
            tracing::debug!(target: "pipeline", id = %item.id(), "dropping near-duplicate title");
            dropped += 1;
            continue;
        }
        kept_titles.push(title);
        kept.push(item);
    }
    (kept, dropped)
}

fn normalize_title(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
