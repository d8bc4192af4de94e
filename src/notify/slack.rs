use reqwest::Client;

use super::{post_json, Deliverer, Message};
use crate::errors::{ConfigurationError, DeliveryError};
use crate::retry::RetryPolicy;

pub struct SlackDeliverer {
    webhook_url: String,
    client: Client,
    retry: RetryPolicy,
}

impl SlackDeliverer {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let url = std::env::var("SLACK_WEBHOOK_URL")
            .map_err(|_| ConfigurationError::new("SLACK_WEBHOOK_URL missing"))?;
        Self::new(url)
    }

    /// Optional builder for tests/tools
    pub fn new(url: String) -> Result<Self, ConfigurationError> {
        if url.trim().is_empty() {
            return Err(ConfigurationError::new("SLACK_WEBHOOK_URL is empty"));
        }
        Ok(Self {
            webhook_url: url,
            client: Client::new(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait::async_trait]
impl Deliverer for SlackDeliverer {
    fn channel(&self) -> &str {
        "slack"
    }

    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        // Slack mrkdwn bolds with single asterisks, same as the rendered body.
        let body = serde_json::json!({ "text": message.body });
        post_json(&self.client, &self.webhook_url, &body, &self.retry, self.channel()).await
    }
}
