//! Error taxonomy shared by sources, deliverers, persistence and configuration.
//!
//! Everything except [`ConfigurationError`] is recoverable: the pipeline records it in
//! the cycle report and keeps going.

use serde::Serialize;
use thiserror::Error;

/// A feed could not be reached (after its own retries) or returned garbage.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("source `{feed}` unavailable for query `{query}`: {reason}")]
pub struct SourceUnavailable {
    pub feed: String,
    pub query: String,
    pub reason: String,
}

impl SourceUnavailable {
    pub fn new(feed: impl Into<String>, query: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            feed: feed.into(),
            query: query.into(),
            reason: reason.into(),
        }
    }
}

/// Whether a failure may go away on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeouts, network errors, 5xx / 408 / 429.
    Transient,
    /// Authentication, malformed payload, other 4xx.
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("delivery via {channel} failed after {attempts} attempt(s): {reason}")]
pub struct DeliveryError {
    pub channel: String,
    pub kind: FailureKind,
    pub attempts: u32,
    pub reason: String,
}

/// Durable write/read failure. Ids already delivered may be sent again after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("persistence failure on {target}: {reason}")]
pub struct PersistenceError {
    pub target: String,
    pub reason: String,
}

impl PersistenceError {
    pub fn new(target: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}

/// Invalid or missing settings. Only raised while building the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("configuration error: {0}")]
pub struct ConfigurationError(pub String);

impl ConfigurationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// One entry in a cycle report's error list.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleError {
    #[error(transparent)]
    Source(#[from] SourceUnavailable),
    #[error("candidate `{candidate_id}`: {error}")]
    Delivery {
        candidate_id: String,
        error: DeliveryError,
    },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl CycleError {
    pub fn is_persistence(&self) -> bool {
        matches!(self, CycleError::Persistence(_))
    }
}
