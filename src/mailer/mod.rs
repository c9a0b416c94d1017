//! Digest delivery over SMTP.
//!
//! The [`Mailer`] trait lets the binary and tests swap the real SMTP
//! transport for an in-memory recorder.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::info;

use crate::config::SmtpConfig;
use crate::render::RenderedDigest;

#[derive(Debug, Error)]
pub enum MailError {
    /// A required SMTP setting is missing
    #[error("SMTP is not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

pub type MailResult<T> = Result<T, MailError>;

/// Something that can deliver a rendered digest.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, digest: &RenderedDigest) -> MailResult<()>;
}

/// STARTTLS SMTP relay with username/password login.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    server: String,
    port: u16,
    username: String,
    password: String,
    sender: Mailbox,
    recipients: Vec<Mailbox>,
}

impl SmtpMailer {
    /// Build a mailer from configuration. `recipient` may hold several
    /// comma-separated addresses.
    pub fn from_config(config: &SmtpConfig) -> MailResult<Self> {
        let sender = required(&config.sender, "smtp.sender")?;
        let password = required(&config.password, "smtp.password")?;
        let recipient = required(&config.recipient, "smtp.recipient")?;
        let username = config.login().unwrap_or(sender).trim().to_string();

        let recipients = recipient
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::parse::<Mailbox>)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            server: config.server.clone(),
            port: config.port,
            username,
            password: password.to_string(),
            sender: sender.trim().parse()?,
            recipients,
        })
    }

    /// Assemble the multipart/alternative (text + HTML) message.
    pub fn build_message(&self, digest: &RenderedDigest) -> MailResult<Message> {
        let mut builder = Message::builder().from(self.sender.clone()).subject(digest.subject.clone());
        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }
        let message = builder.multipart(MultiPart::alternative_plain_html(
            digest.text.clone(),
            digest.html.clone(),
        ))?;
        Ok(message)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, digest: &RenderedDigest) -> MailResult<()> {
        let message = self.build_message(digest)?;

        let creds = Credentials::new(self.username.clone(), self.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.server)?
            .port(self.port)
            .credentials(creds)
            .build();

        let response = transport.send(message).await?;
        info!(
            server = %self.server,
            recipients = self.recipients.len(),
            code = %response.code(),
            "Digest sent"
        );
        Ok(())
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> MailResult<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| MailError::NotConfigured(format!("{field} is not set")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp() -> SmtpConfig {
        SmtpConfig {
            sender: Some("digest@example.org".to_string()),
            password: Some("secret".to_string()),
            recipient: Some("reader@example.org, second@example.org".to_string()),
            ..SmtpConfig::default()
        }
    }

    fn rendered() -> RenderedDigest {
        RenderedDigest {
            subject: "Astro-ph Digest: no papers found".to_string(),
            text: "0 papers found".to_string(),
            html: "<p>0 papers found</p>".to_string(),
        }
    }

    #[test]
    fn test_from_config_requires_settings() {
        let err = SmtpMailer::from_config(&SmtpConfig::default()).unwrap_err();
        assert!(matches!(err, MailError::NotConfigured(_)));
    }

    #[test]
    fn test_from_config_rejects_bad_address() {
        let mut config = smtp();
        config.recipient = Some("not an address".to_string());
        let err = SmtpMailer::from_config(&config).unwrap_err();
        assert!(matches!(err, MailError::Address(_)));
    }

    #[test]
    fn test_login_defaults_to_sender() {
        let mailer = SmtpMailer::from_config(&smtp()).unwrap();
        assert_eq!(mailer.username, "digest@example.org");
        assert_eq!(mailer.recipients.len(), 2);
        assert_eq!(mailer.port, 587);
    }

    #[test]
    fn test_message_is_multipart_alternative() {
        let mailer = SmtpMailer::from_config(&smtp()).unwrap();
        let message = mailer.build_message(&rendered()).unwrap();
        let formatted = String::from_utf8_lossy(&message.formatted()).to_string();

        assert!(formatted.contains("Subject: Astro-ph Digest: no papers found"));
        assert!(formatted.contains("multipart/alternative"));
        assert!(formatted.contains("text/plain"));
        assert!(formatted.contains("text/html"));
        assert!(formatted.contains("reader@example.org"));
        assert!(formatted.contains("second@example.org"));
    }
}
