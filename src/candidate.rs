//! Candidate records flowing through one cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One fetched item (post or video) eligible for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    /// Name of the feed that produced it, e.g. "reddit", "tiktok".
    pub source: String,
    /// `None` means the origin time is unknown.
    pub created_at: Option<DateTime<Utc>>,
    pub metrics: BTreeMap<String, f64>,
    pub payload: BTreeMap<String, String>,
}

impl Candidate {
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            created_at: None,
            metrics: BTreeMap::new(),
            payload: BTreeMap::new(),
        }
    }

    pub fn with_created_at(mut self, ts: DateTime<Utc>) -> Self {
        self.created_at = Some(ts);
        self
    }

    pub fn with_metric(mut self, name: &str, value: f64) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }

    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.payload.insert(name.to_string(), value.into());
        self
    }

    /// Missing metrics read as 0.
    pub fn metric(&self, name: &str) -> f64 {
        self.metrics.get(name).copied().unwrap_or(0.0)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.payload.get(name).map(String::as_str)
    }

    pub fn title(&self) -> &str {
        self.field("title").unwrap_or_default()
    }

    pub fn has_valid_id(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// Origin time, with unknown (or epoch) timestamps mapped to `now`.
    pub fn effective_created_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.created_at {
            Some(ts) if ts.timestamp() > 0 => ts,
            _ => now,
        }
    }
}

/// Why a candidate was left out of the ranked list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusion {
    Seen,
    Stale,
    BelowThreshold,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    /// In [0,1]; 0 for excluded candidates.
    pub score: f64,
    pub included: bool,
    pub exclusion: Option<Exclusion>,
}

impl ScoredCandidate {
    pub fn included(candidate: Candidate, score: f64) -> Self {
        Self {
            candidate,
            score: score.clamp(0.0, 1.0),
            included: true,
            exclusion: None,
        }
    }

    pub fn excluded(candidate: Candidate, why: Exclusion) -> Self {
        Self {
            candidate,
            score: 0.0,
            included: false,
            exclusion: Some(why),
        }
    }

    pub fn id(&self) -> &str {
        &self.candidate.id
    }
}
