//! Mail transports.
//!
//! The notifier composes an [`EmailMessage`] and hands it to a [`MailTransport`].
//! The transport decides how to deliver: `console` logs the message, `smtp`
//! relays it. Delivery errors are returned as-is; there is no retry here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::settings::{EmailSettings, MailBackend};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
    pub from_email: String,
    pub recipients: Vec<String>,
}

/// Mail delivery abstraction.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver a message and return how many messages were handed off (0 or 1).
    async fn send(&self, message: &EmailMessage) -> Result<usize>;
}

/// Console backend: logs the message instead of sending it.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl MailTransport for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<usize> {
        if message.recipients.is_empty() {
            return Ok(0);
        }

        info!(
            from_email = %message.from_email,
            recipients = %message.recipients.join(", "),
            subject = %message.subject,
            body = %message.body,
            "email console send"
        );
        Ok(1)
    }
}

/// SMTP relay backend.
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailSender {
    /// # Errors
    /// Returns an error if the STARTTLS relay cannot be configured for the host.
    pub fn new(settings: &EmailSettings) -> Result<Self> {
        let builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .with_context(|| format!("invalid SMTP relay {}", settings.host))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(settings.host.as_str())
        };

        let builder = builder.port(settings.port);
        let builder = if settings.host_user.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                settings.host_user.clone(),
                settings.host_password.expose_secret().to_string(),
            ))
        };

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpEmailSender {
    #[instrument(skip(self, message), fields(subject = %message.subject))]
    async fn send(&self, message: &EmailMessage) -> Result<usize> {
        if message.recipients.iter().all(|r| r.trim().is_empty()) {
            debug!("no recipients, nothing to relay");
            return Ok(0);
        }

        let email = build_message(message)?;
        self.transport
            .send(email)
            .await
            .context("SMTP delivery failed")?;
        Ok(1)
    }
}

fn build_message(message: &EmailMessage) -> Result<Message> {
    let from: Mailbox = message
        .from_email
        .parse()
        .with_context(|| format!("invalid sender address {}", message.from_email))?;

    let mut builder = Message::builder()
        .from(from)
        .subject(message.subject.as_str())
        .header(ContentType::TEXT_PLAIN);

    for recipient in message.recipients.iter().filter(|r| !r.trim().is_empty()) {
        let to: Mailbox = recipient
            .parse()
            .with_context(|| format!("invalid recipient address {recipient}"))?;
        builder = builder.to(to);
    }

    builder
        .body(message.body.clone())
        .context("failed to build email message")
}

/// Transport configured by `EMAIL_BACKEND`.
///
/// # Errors
/// Returns an error if the SMTP transport cannot be configured.
pub fn transport_from_settings(settings: &EmailSettings) -> Result<Arc<dyn MailTransport>> {
    Ok(match settings.backend {
        MailBackend::Console => Arc::new(LogEmailSender),
        MailBackend::Smtp => Arc::new(SmtpEmailSender::new(settings)?),
    })
}
