// src/analyze/mod.rs
//! Pure analysis stages: keyword extraction, filtering/scoring and ranking.
//! No I/O here; everything is deterministic for a given input batch and clock.

pub mod keywords;
pub mod rank;
pub mod scoring;

// Re-export convenient types.
pub use crate::analyze::keywords::{extract_keywords, is_pain_related, problem_category};
pub use crate::analyze::rank::{rank, suppress_similar_titles};
pub use crate::analyze::scoring::{Scorer, ScoringConfig, ScoringContext, Weights};

use crate::candidate::Candidate;

/// Collect context keywords from problem posts: posts with a higher `score` metric
/// contribute first, ties keep feed order; duplicates removed; at most `cap` kept.
pub fn context_keywords(posts: &[Candidate], cap: usize) -> Vec<String> {
    let mut order: Vec<usize> = (0..posts.len()).collect();
    order.sort_by(|&a, &b| {
        posts[b]
            .metric("score")
            .total_cmp(&posts[a].metric("score"))
            .then(a.cmp(&b))
    });

    let mut out: Vec<String> = Vec::new();
    for i in order {
        for kw in extract_keywords(posts[i].title()) {
            if out.len() >= cap {
                return out;
            }
            if !out.contains(&kw) {
                out.push(kw);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keywords_prefer_popular_posts() {
        let posts = vec![
            Candidate::new("p1", "reddit")
                .with_field("title", "Cheap standing desk converter")
                .with_metric("score", 3.0),
            Candidate::new("p2", "reddit")
                .with_field("title", "Lumbar cushion saved my back")
                .with_metric("score", 90.0),
        ];
        let kw = context_keywords(&posts, 4);
        assert_eq!(kw, vec!["lumbar", "cushion", "saved", "back"]);

        let all = context_keywords(&posts, 50);
        assert!(all.contains(&"standing".to_string()));
    }
}
