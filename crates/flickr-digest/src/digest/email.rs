//! Email sender using SMTP.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::config::SmtpConfig;
use crate::error::DigestError;

/// Delivers a rendered digest.
#[async_trait]
pub trait DigestSender: Send + Sync {
    /// Send the HTML document.
    async fn send(&self, html: &str) -> Result<(), DigestError>;
}

/// SMTP sender for digests.
pub struct EmailSender {
    config: SmtpConfig,
}

impl EmailSender {
    /// Create a new email sender with the given configuration.
    #[must_use]
    pub const fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Build the message. Bcc recipients end up in the envelope only.
    pub fn build_message(&self, html_body: &str) -> Result<Message, DigestError> {
        if !self.config.has_recipients() {
            return Err(DigestError::NoRecipients);
        }

        let mut builder = Message::builder()
            .from(parse_mailbox(&self.config.from)?)
            .subject(self.config.subject.as_str());
        for address in &self.config.to {
            builder = builder.to(parse_mailbox(address)?);
        }
        for address in &self.config.cc {
            builder = builder.cc(parse_mailbox(address)?);
        }
        for address in &self.config.bcc {
            builder = builder.bcc(parse_mailbox(address)?);
        }

        Ok(builder
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())?)
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, DigestError> {
        let builder = if self.config.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.server)
        };

        let mut builder = builder.port(self.config.port);
        if let Some((user, password)) = self.config.login() {
            builder = builder.credentials(Credentials::new(user.to_string(), password.to_string()));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl DigestSender for EmailSender {
    async fn send(&self, html: &str) -> Result<(), DigestError> {
        let email = self.build_message(html)?;
        let mailer = self.transport()?;

        tracing::debug!(
            server = %self.config.server,
            port = self.config.port,
            tls = self.config.tls,
            "Connecting to SMTP server"
        );
        mailer.send(email).await?;

        tracing::info!(
            to = %self.config.to.join(", "),
            cc = self.config.cc.len(),
            bcc = self.config.bcc.len(),
            subject = %self.config.subject,
            "Email sent successfully"
        );
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DigestError> {
    address.parse().map_err(|source| DigestError::Address {
        address: address.to_string(),
        source,
    })
}
