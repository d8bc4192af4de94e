//! Bounded retry for outbound calls (feed fetches and deliveries).
//!
//! Each attempt runs under its own timeout; a timeout counts as a transient failure.
//! Permanent failures stop immediately.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::FailureKind;

/// Outcome of a single failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptError {
    pub kind: FailureKind,
    pub reason: String,
}

impl AttemptError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            reason: reason.into(),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            reason: reason.into(),
        }
    }
}

/// Final failure after the policy gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted {
    pub kind: FailureKind,
    pub attempts: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    Fixed,
    #[default]
    Exponential,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff: Backoff::Exponential,
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn no_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let shift = attempt.saturating_sub(1).min(16);
                self.base_delay.saturating_mul(1u32 << shift)
            }
        }
    }

    /// Longest `run` can take: every attempt timing out plus every backoff delay.
    pub fn worst_case(&self) -> Duration {
        let max = self.max_attempts.max(1);
        let delays: Duration = (1..max).map(|a| self.delay_after(a)).sum();
        self.attempt_timeout.saturating_mul(max) + delays
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let res = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(r) => r,
                Err(_) => Err(AttemptError::transient(format!(
                    "timed out after {:?}",
                    self.attempt_timeout
                ))),
            };

            match res {
                Ok(v) => return Ok(v),
                Err(e) if e.kind == FailureKind::Transient && attempt < max => {
                    let delay = self.delay_after(attempt);
                    tracing::debug!(attempt, ?delay, reason = %e.reason, "transient failure, retrying");
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    return Err(RetryExhausted {
                        kind: e.kind,
                        attempts: attempt,
                        reason: e.reason,
                    })
                }
            }
        }
    }
}

/// Map an HTTP status to an attempt outcome. 408, 429 and 5xx are worth retrying.
pub fn classify_status(status: reqwest::StatusCode) -> Result<(), AttemptError> {
    if status.is_success() {
        return Ok(());
    }
    let reason = format!("HTTP {status}");
    if status.is_server_error()
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
    {
        Err(AttemptError::transient(reason))
    } else {
        Err(AttemptError::permanent(reason))
    }
}

pub fn classify_reqwest(err: &reqwest::Error) -> AttemptError {
    if err.is_builder() || err.is_decode() {
        AttemptError::permanent(err.to_string())
    } else if let Some(status) = err.status() {
        classify_status(status)
            .err()
            .unwrap_or_else(|| AttemptError::permanent(err.to_string()))
    } else {
        AttemptError::transient(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::no_delay(3);
        let out = policy
            .run(move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(AttemptError::transient("503"))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(out, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn worst_case_covers_every_attempt_and_delay() {
        let p = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff: Backoff::Exponential,
            attempt_timeout: Duration::from_secs(20),
        };
        // 3 x 20s + 500ms + 1s
        assert_eq!(p.worst_case(), Duration::from_millis(61_500));
        assert_eq!(RetryPolicy::no_delay(1).worst_case(), RetryPolicy::default().attempt_timeout);
    }

    #[tokio::test]
    async fn permanent_failure_stops_after_one_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let out: Result<(), _> = RetryPolicy::no_delay(5)
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AttemptError::permanent("401"))
            })
            .await;
        let err = out.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(err.kind, FailureKind::Permanent);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeouts_count_as_transient_attempts() {
        let policy = RetryPolicy::no_delay(2).with_attempt_timeout(Duration::from_millis(10));
        let out: Result<(), _> = policy
            .run(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        let err = out.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert_eq!(err.kind, FailureKind::Transient);
        assert!(err.reason.contains("timed out"));
    }

    #[test]
    fn exponential_delay_doubles() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_after(1), Duration::from_millis(500));
        assert_eq!(p.delay_after(2), Duration::from_millis(1000));
        let fixed = RetryPolicy {
            backoff: Backoff::Fixed,
            ..p
        };
        assert_eq!(fixed.delay_after(3), Duration::from_millis(500));
    }

    #[test]
    fn status_classification() {
        use reqwest::StatusCode;
        assert!(classify_status(StatusCode::OK).is_ok());
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY).unwrap_err().kind,
            FailureKind::Transient
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS).unwrap_err().kind,
            FailureKind::Transient
        );
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED).unwrap_err().kind,
            FailureKind::Permanent
        );
    }
}
