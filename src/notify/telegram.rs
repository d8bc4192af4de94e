// src/notify/telegram.rs
use reqwest::Client;
use serde::Serialize;

use super::{post_json, Deliverer, Message};
use crate::errors::{ConfigurationError, DeliveryError};
use crate::retry::RetryPolicy;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
/// Telegram rejects longer texts outright.
const MAX_TEXT_CHARS: usize = 4096;

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Clone)]
pub struct TelegramDeliverer {
    api_base: String,
    token: String,
    chat_id: String,
    client: Client,
    retry: RetryPolicy,
}

impl TelegramDeliverer {
    pub fn new(token: &str, chat_id: &str) -> Result<Self, ConfigurationError> {
        if token.trim().is_empty() {
            return Err(ConfigurationError::new("TELEGRAM_BOT_TOKEN is empty"));
        }
        if chat_id.trim().is_empty() {
            return Err(ConfigurationError::new("TELEGRAM_CHAT_ID is empty"));
        }
        Ok(Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.trim().to_string(),
            chat_id: chat_id.trim().to_string(),
            client: Client::new(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn from_env() -> Result<Self, ConfigurationError> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| ConfigurationError::new("TELEGRAM_BOT_TOKEN missing"))?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID")
            .map_err(|_| ConfigurationError::new("TELEGRAM_CHAT_ID missing"))?;
        Self::new(&token, &chat_id)
    }

    /// Point at another Bot API host (self-hosted server, tests).
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }
}

#[async_trait::async_trait]
impl Deliverer for TelegramDeliverer {
    fn channel(&self) -> &str {
        "telegram"
    }

    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text: message.body.chars().take(MAX_TEXT_CHARS).collect(),
            parse_mode: "Markdown",
            disable_web_page_preview: false,
        };
        post_json(&self.client, &self.endpoint(), &payload, &self.retry, self.channel())
            .await
            // The token is part of the URL; keep it out of logs and reports.
            .map_err(|mut e| {
                e.reason = e.reason.replace(&self.token, "<token>");
                e
            })
    }
}
