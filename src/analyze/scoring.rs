//! Inclusion filter and relevance score for candidates.
//!
//! Filter (all must hold): not already delivered, not older than `max_age`, primary
//! metric at or above `min_threshold`.
//!
//! Score = w_primary*clip(primary/primary_scale) + w_secondary*clip(secondary/secondary_scale)
//!       + w_keywords*clip(|words ∩ context| / keyword_k)
//! with weights normalized to sum to 1.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;

use super::keywords::tokenize;
use crate::candidate::{Candidate, Exclusion, ScoredCandidate};
use crate::seen::SeenSet;

/// A century; keeps `ChronoDuration::hours` far from overflow.
const MAX_AGE_CAP_HOURS: u64 = 24 * 365 * 100;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Weights {
    pub primary: f64,
    pub secondary: f64,
    pub keywords: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            primary: 0.5,
            secondary: 0.2,
            keywords: 0.3,
        }
    }
}

impl Weights {
    /// Scale to sum 1. Negative weights count as 0; all-zero falls back to defaults.
    pub fn normalized(self) -> Self {
        let p = self.primary.max(0.0);
        let s = self.secondary.max(0.0);
        let k = self.keywords.max(0.0);
        let sum = p + s + k;
        if sum <= f64::EPSILON {
            return Self::default();
        }
        Self {
            primary: p / sum,
            secondary: s / sum,
            keywords: k / sum,
        }
    }
}

/// Tuning knobs. The scales are heuristics, not derived from data.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub max_age_hours: u64,
    pub primary_metric: String,
    pub min_threshold: f64,
    pub primary_scale: f64,
    pub secondary_metric: String,
    pub secondary_scale: f64,
    /// Overlap of `keyword_k` words with the context saturates the keyword signal.
    pub keyword_k: f64,
    pub tiebreak_metric: String,
    pub weights: Weights,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_age_hours: 48,
            primary_metric: "views".into(),
            min_threshold: 10_000.0,
            primary_scale: 100_000.0,
            secondary_metric: "likes".into(),
            secondary_scale: 10_000.0,
            keyword_k: 3.0,
            tiebreak_metric: "views".into(),
            weights: Weights::default(),
        }
    }
}

/// Per-cycle inputs shared by every evaluation.
#[derive(Clone, Debug)]
pub struct ScoringContext {
    pub now: DateTime<Utc>,
    pub keywords: BTreeSet<String>,
}

impl ScoringContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            keywords: BTreeSet::new(),
        }
    }

    pub fn with_keywords<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for w in words {
            self.keywords.extend(tokenize(w.as_ref()));
        }
        self
    }
}

#[derive(Clone, Debug)]
pub struct Scorer {
    cfg: ScoringConfig,
    weights: Weights,
}

impl Scorer {
    pub fn new(cfg: ScoringConfig) -> Self {
        let weights = cfg.weights.normalized();
        Self { cfg, weights }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.cfg
    }

    pub fn weights(&self) -> Weights {
        self.weights
    }

    pub fn max_age(&self) -> ChronoDuration {
        ChronoDuration::hours(self.cfg.max_age_hours.min(MAX_AGE_CAP_HOURS) as i64)
    }

    pub fn evaluate(
        &self,
        candidate: Candidate,
        ctx: &ScoringContext,
        seen: &SeenSet,
    ) -> ScoredCandidate {
        if seen.contains(&candidate.id) {
            return ScoredCandidate::excluded(candidate, Exclusion::Seen);
        }

        let created = candidate.effective_created_at(ctx.now);
        let age = ctx.now.signed_duration_since(created).max(ChronoDuration::zero());
        if age > self.max_age() {
            return ScoredCandidate::excluded(candidate, Exclusion::Stale);
        }

        if candidate.metric(&self.cfg.primary_metric) < self.cfg.min_threshold {
            return ScoredCandidate::excluded(candidate, Exclusion::BelowThreshold);
        }

        let score = self.score(&candidate, ctx);
        ScoredCandidate::included(candidate, score)
    }

    pub fn score(&self, candidate: &Candidate, ctx: &ScoringContext) -> f64 {
        let primary = norm(
            candidate.metric(&self.cfg.primary_metric),
            self.cfg.primary_scale,
        );
        let secondary = norm(
            candidate.metric(&self.cfg.secondary_metric),
            self.cfg.secondary_scale,
        );
        let overlap = keyword_overlap(candidate, &ctx.keywords, self.cfg.keyword_k);

        let w = self.weights;
        (w.primary * primary + w.secondary * secondary + w.keywords * overlap).clamp(0.0, 1.0)
    }
}

fn norm(value: f64, scale: f64) -> f64 {
    if scale <= 0.0 || !value.is_finite() {
        return 0.0;
    }
    (value / scale).clamp(0.0, 1.0)
}

/// |words(candidate) ∩ context| / k, clipped to [0,1].
pub fn keyword_overlap(candidate: &Candidate, context: &BTreeSet<String>, k: f64) -> f64 {
    if context.is_empty() || k <= 0.0 {
        return 0.0;
    }
    let mut words = BTreeSet::new();
    for field in ["title", "text", "query"] {
        if let Some(v) = candidate.field(field) {
            words.extend(tokenize(v));
        }
    }
    let hits = words.intersection(context).count() as f64;
    (hits / k).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRowStore;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap()
    }

    async fn seen_with(ids: &[&str]) -> SeenSet {
        let mut s = SeenSet::load(Arc::new(MemoryRowStore::new()), None)
            .await
            .unwrap();
        for id in ids {
            s.add(id);
        }
        s
    }

    fn video(id: &str, views: f64, age_hours: i64) -> Candidate {
        Candidate::new(id, "tiktok")
            .with_created_at(now() - ChronoDuration::hours(age_hours))
            .with_metric("views", views)
    }

    #[tokio::test]
    async fn stale_candidates_are_excluded_regardless_of_metrics() {
        let scorer = Scorer::new(ScoringConfig::default());
        let ctx = ScoringContext::new(now());
        let seen = seen_with(&[]).await;

        let out = scorer.evaluate(video("old", 9_000_000.0, 49), &ctx, &seen);
        assert!(!out.included);
        assert_eq!(out.exclusion, Some(Exclusion::Stale));
        assert_eq!(out.score, 0.0);
    }

    #[tokio::test]
    async fn seen_ids_are_excluded_first() {
        let scorer = Scorer::new(ScoringConfig::default());
        let ctx = ScoringContext::new(now());
        let seen = seen_with(&["v1"]).await;

        let out = scorer.evaluate(video("v1", 9_000_000.0, 100), &ctx, &seen);
        assert_eq!(out.exclusion, Some(Exclusion::Seen));
    }

    #[tokio::test]
    async fn below_threshold_and_unknown_timestamp() {
        let scorer = Scorer::new(ScoringConfig::default());
        let ctx = ScoringContext::new(now());
        let seen = seen_with(&[]).await;

        let low = scorer.evaluate(video("low", 9_999.0, 1), &ctx, &seen);
        assert_eq!(low.exclusion, Some(Exclusion::BelowThreshold));

        // Unknown origin time is treated as "now", never as arbitrarily old.
        let undated = Candidate::new("undated", "tiktok").with_metric("views", 20_000.0);
        let out = scorer.evaluate(undated, &ctx, &seen);
        assert!(out.included);
    }

    #[tokio::test]
    async fn score_is_weighted_sum_of_clipped_signals() {
        let cfg = ScoringConfig {
            weights: Weights {
                primary: 2.0,
                secondary: 1.0,
                keywords: 1.0,
            },
            ..ScoringConfig::default()
        };
        let scorer = Scorer::new(cfg);
        let w = scorer.weights();
        assert!((w.primary + w.secondary + w.keywords - 1.0).abs() < 1e-9);

        let ctx = ScoringContext::new(now()).with_keywords(["lumbar", "cushion", "posture"]);
        let seen = seen_with(&[]).await;
        let c = video("v", 250_000.0, 1)
            .with_metric("likes", 5_000.0)
            .with_field("title", "Lumbar support cushion review");

        let out = scorer.evaluate(c, &ctx, &seen);
        // primary clipped to 1.0, secondary 0.5, overlap 2/3
        let expected = 0.5 * 1.0 + 0.25 * 0.5 + 0.25 * (2.0 / 3.0);
        assert!((out.score - expected).abs() < 1e-9, "got {}", out.score);
    }

    #[test]
    fn overlap_saturates_at_k() {
        let ctx: BTreeSet<String> = ["foam", "memory", "pillow", "neck"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let c = Candidate::new("x", "tiktok").with_field("title", "memory foam neck pillow");
        assert_eq!(keyword_overlap(&c, &ctx, 3.0), 1.0);
        assert_eq!(keyword_overlap(&c, &BTreeSet::new(), 3.0), 0.0);
    }

    #[test]
    fn zero_weights_fall_back_to_defaults() {
        let w = Weights {
            primary: 0.0,
            secondary: 0.0,
            keywords: 0.0,
        }
        .normalized();
        assert_eq!(w, Weights::default());
    }
}
