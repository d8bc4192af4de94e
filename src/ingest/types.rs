// src/ingest/types.rs
use std::sync::Arc;

use crate::candidate::Candidate;
use crate::errors::SourceUnavailable;

/// A feed of candidates. Calls must be free of side effects beyond the fetch itself,
/// so the pipeline may repeat them.
///
/// Reachable-but-empty is `Ok(vec![])`; unreachable after the source's own retries is
/// `Err(SourceUnavailable)`.
#[async_trait::async_trait]
pub trait CandidateSource: Send + Sync {
    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, SourceUnavailable>;
    fn name(&self) -> &str;
}

/// A source plus the queries to run against it each cycle.
#[derive(Clone)]
pub struct Feed {
    pub source: Arc<dyn CandidateSource>,
    pub queries: Vec<String>,
    pub limit: usize,
    /// Also search for the context keywords gathered from the problem feed.
    pub follow_context: bool,
    /// Items older than this are dropped by the consumer. Only the context feed sets it.
    pub max_age: Option<chrono::Duration>,
}

impl Feed {
    pub fn new(source: Arc<dyn CandidateSource>, queries: Vec<String>, limit: usize) -> Self {
        Self {
            source,
            queries,
            limit,
            follow_context: false,
            max_age: None,
        }
    }

    pub fn with_max_age(mut self, max_age: chrono::Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn following_context(mut self) -> Self {
        self.follow_context = true;
        self
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("source", &self.source.name())
            .field("queries", &self.queries)
            .field("limit", &self.limit)
            .field("follow_context", &self.follow_context)
            .field("max_age", &self.max_age)
            .finish()
    }
}
