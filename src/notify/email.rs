use lettre::message::{header, Mailbox, Message as Email};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{exhausted, Deliverer, Message};
use crate::errors::{ConfigurationError, DeliveryError};
use crate::retry::{AttemptError, RetryPolicy};

pub struct EmailDeliverer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
    retry: RetryPolicy,
}

fn env(name: &str) -> Result<String, ConfigurationError> {
    std::env::var(name).map_err(|_| ConfigurationError::new(format!("{name} missing")))
}

impl EmailDeliverer {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let host = env("SMTP_HOST")?;
        let user = env("SMTP_USER")?;
        let pass = env("SMTP_PASS")?;
        let from_addr = env("NOTIFY_EMAIL_FROM")?;
        let to_addr = env("NOTIFY_EMAIL_TO")?;

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .map_err(|e| ConfigurationError::new(format!("invalid SMTP_HOST: {e}")))?
            .credentials(creds)
            .build();

        let from = from_addr
            .parse::<Mailbox>()
            .map_err(|e| ConfigurationError::new(format!("invalid NOTIFY_EMAIL_FROM: {e}")))?;
        let to = to_addr
            .parse::<Mailbox>()
            .map_err(|e| ConfigurationError::new(format!("invalid NOTIFY_EMAIL_TO: {e}")))?;

        Ok(Self {
            mailer,
            from,
            to,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build(&self, message: &Message) -> Result<Email, AttemptError> {
        let body = format!("{}\n\n{}\n", message.body, message.url);
        Email::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(format!("Viral match: {}", message.title))
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AttemptError::permanent(format!("build email: {e}")))
    }
}

#[async_trait::async_trait]
impl Deliverer for EmailDeliverer {
    fn channel(&self) -> &str {
        "email"
    }

    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        let email = self.build(message).map_err(|e| DeliveryError {
            channel: self.channel().to_string(),
            kind: e.kind,
            attempts: 1,
            reason: e.reason,
        })?;

        let mailer = &self.mailer;
        let email = &email;
        self.retry
            .run(move || async move {
                match mailer.send(email.clone()).await {
                    Ok(_) => Ok(()),
                    Err(e) if e.is_permanent() => Err(AttemptError::permanent(format!("send email: {e}"))),
                    Err(e) => Err(AttemptError::transient(format!("send email: {e}"))),
                }
            })
            .await
            .map_err(|e| exhausted(self.channel(), e))
    }
}
