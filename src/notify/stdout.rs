use super::{Deliverer, Message};
use crate::errors::DeliveryError;

/// Dry-run channel: prints the message instead of sending it.
#[derive(Debug, Default, Clone)]
pub struct StdoutDeliverer;

#[async_trait::async_trait]
impl Deliverer for StdoutDeliverer {
    fn channel(&self) -> &str {
        "stdout"
    }

    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        tracing::info!(target: "notify", url = %message.url, title = %message.title, "dry-run delivery");
        println!("{}\n", message.body);
        Ok(())
    }
}
