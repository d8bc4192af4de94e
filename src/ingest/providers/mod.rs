// src/ingest/providers/mod.rs
pub mod reddit;
pub mod tiktok;

use reqwest::Client;
use std::time::Duration;

use crate::errors::{ConfigurationError, SourceUnavailable};
use crate::retry::{classify_reqwest, classify_status, RetryPolicy};

pub const DEFAULT_USER_AGENT: &str = "viral-radar/0.1 (+https://github.com/viral-radar)";

/// HTTP knobs shared by the JSON-backed sources.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for HttpSettings {
    fn default() -> Self {
        let timeout = Duration::from_secs(20);
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout,
            retry: RetryPolicy::default().with_attempt_timeout(timeout),
        }
    }
}

pub(crate) fn build_client(settings: &HttpSettings) -> Result<Client, ConfigurationError> {
    Client::builder()
        .user_agent(settings.user_agent.clone())
        .timeout(settings.timeout)
        .build()
        .map_err(|e| ConfigurationError::new(format!("http client: {e}")))
}

/// GET `url` and return the body, retrying transient failures.
pub(crate) async fn get_text(
    client: &Client,
    url: &str,
    params: &[(&str, String)],
    retry: &RetryPolicy,
    feed: &str,
    query: &str,
) -> Result<String, SourceUnavailable> {
    retry
        .run(move || async move {
            let resp = client
                .get(url)
                .query(params)
                .send()
                .await
                .map_err(|e| classify_reqwest(&e))?;
            classify_status(resp.status())?;
            resp.text().await.map_err(|e| classify_reqwest(&e))
        })
        .await
        .map_err(|e| {
            SourceUnavailable::new(
                feed,
                query,
                format!("{} (after {} attempt(s))", e.reason, e.attempts),
            )
        })
}
