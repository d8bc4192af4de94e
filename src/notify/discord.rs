use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{post_json, Deliverer, Message};
use crate::errors::{ConfigurationError, DeliveryError};
use crate::retry::RetryPolicy;

/// Discord caps embed descriptions at 4096 characters.
const MAX_DESCRIPTION_CHARS: usize = 4096;

#[derive(Clone)]
pub struct DiscordDeliverer {
    webhook: String,
    client: Client,
    retry: RetryPolicy,
}

impl DiscordDeliverer {
    pub fn new(webhook: String) -> Result<Self, ConfigurationError> {
        if webhook.trim().is_empty() {
            return Err(ConfigurationError::new("DISCORD_WEBHOOK_URL is empty"));
        }
        Ok(Self {
            webhook,
            client: Client::new(),
            retry: RetryPolicy {
                attempt_timeout: Duration::from_secs(5),
                ..RetryPolicy::default()
            },
        })
    }

    pub fn from_env() -> Result<Self, ConfigurationError> {
        let url = std::env::var("DISCORD_WEBHOOK_URL")
            .map_err(|_| ConfigurationError::new("DISCORD_WEBHOOK_URL missing"))?;
        Self::new(url)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait::async_trait]
impl Deliverer for DiscordDeliverer {
    fn channel(&self) -> &str {
        "discord"
    }

    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        let payload = DiscordWebhookPayload::embed(&message.title, &message.body, &message.url);
        post_json(&self.client, &self.webhook, &payload, &self.retry, self.channel()).await
    }
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    url: String,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    fn embed(title: &str, description: &str, url: &str) -> Self {
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                // Embed titles are limited to 256 characters.
                title: title.chars().take(256).collect(),
                description: description.chars().take(MAX_DESCRIPTION_CHARS).collect(),
                url: url.to_string(),
            }],
        }
    }
}
