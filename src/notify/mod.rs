// src/notify/mod.rs
pub mod discord;
pub mod email;
pub mod format;
pub mod slack;
pub mod stdout;
pub mod telegram;

use reqwest::Client;
use serde::Serialize;

use crate::errors::DeliveryError;
use crate::retry::{classify_reqwest, classify_status, RetryExhausted, RetryPolicy};

pub use format::render_message;

/// One formatted notification, channel-agnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub title: String,
    /// Markdown-flavoured text (Telegram legacy Markdown subset).
    pub body: String,
    pub url: String,
}

/// "Send one message" with the channel's own bounded retry.
///
/// `Ok` means the channel accepted the message; only then may the caller mark the
/// candidate as delivered.
#[async_trait::async_trait]
pub trait Deliverer: Send + Sync {
    fn channel(&self) -> &str;
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError>;
}

pub(crate) fn exhausted(channel: &str, e: RetryExhausted) -> DeliveryError {
    DeliveryError {
        channel: channel.to_string(),
        kind: e.kind,
        attempts: e.attempts,
        reason: e.reason,
    }
}

/// POST a JSON body; non-2xx is a failure, classified for retry.
pub(crate) async fn post_json<B>(
    client: &Client,
    url: &str,
    body: &B,
    retry: &RetryPolicy,
    channel: &str,
) -> Result<(), DeliveryError>
where
    B: Serialize + Sync,
{
    retry
        .run(move || async move {
            let rsp = client
                .post(url)
                .json(body)
                .send()
                .await
                .map_err(|e| classify_reqwest(&e))?;
            classify_status(rsp.status())
        })
        .await
        .map_err(|e| exhausted(channel, e))
}
