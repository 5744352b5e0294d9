//! SMTP delivery via async lettre.
//!
//! STARTTLS relay with username/password credentials (Gmail, Outlook, custom
//! servers). One message, one recipient, no internal retry.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};
use skycast_core::config::EmailConfig;
use skycast_core::error::{Result, SkycastError};
use skycast_core::traits::Notifier;
use skycast_core::types::Message;

/// Email notifier backed by an SMTP relay.
pub struct EmailSender {
    config: EmailConfig,
}

impl EmailSender {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Build the MIME message without sending it.
    pub fn build_message(&self, message: &Message, recipient: &str) -> Result<LettreMessage> {
        let from_name = self.config.display_name.as_deref().unwrap_or("Skycast");
        let from_mailbox: Mailbox = format!("{from_name} <{}>", self.config.sender())
            .parse()
            .map_err(|e| SkycastError::DeliveryFailed(format!("Invalid from: {e}")))?;

        let to_mailbox: Mailbox = recipient
            .parse()
            .map_err(|e| SkycastError::DeliveryFailed(format!("Invalid to: {e}")))?;

        LettreMessage::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| SkycastError::DeliveryFailed(format!("Build email: {e}")))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
            .map_err(|e| SkycastError::DeliveryFailed(format!("SMTP relay: {e}")))?
            .port(self.config.smtp_port);

        if !self.config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl Notifier for EmailSender {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, message: &Message, recipient: &str) -> Result<()> {
        let email = self.build_message(message, recipient)?;
        self.transport()?
            .send(email)
            .await
            .map_err(|e| SkycastError::DeliveryFailed(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Email sent to: {recipient}");
        Ok(())
    }
}
