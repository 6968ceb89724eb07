//! SMTP provider
//!
//! Relays alerts through an SMTP submission server. Reply codes decide the
//! classification: 4xx is a temporary deferral, 5xx a permanent refusal, and
//! the 53x family means our own credentials are wrong.

use crate::mail::{MailTransport, ProviderError};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// How the connection to the SMTP server is secured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    /// Plain connection upgraded with STARTTLS (port 587)
    #[default]
    Starttls,
    /// TLS from the first byte (port 465)
    Implicit,
    /// No encryption; only for local relays and test servers
    None,
}

/// SMTP provider configuration
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub tls: SmtpTls,
    pub credentials: Option<(String, String)>,
    pub from: String,
    pub timeout: Duration,
}

/// Mail transport backed by an SMTP relay
pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailTransport {
    pub fn new(config: SmtpConfig) -> Result<Self, ProviderError> {
        let from: Mailbox = config.from.parse().map_err(|e| {
            ProviderError::Configuration(format!("invalid sender '{}': {e}", config.from))
        })?;

        let builder = match config.tls {
            SmtpTls::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| ProviderError::Configuration(e.to_string()))?,
            SmtpTls::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| ProviderError::Configuration(e.to_string()))?,
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        };

        let mut builder = builder.port(config.port).timeout(Some(config.timeout));
        if let Some((username, password)) = config.credentials {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> Result<Message, ProviderError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| ProviderError::InvalidRecipient(format!("{to}: {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| ProviderError::Refused(e.to_string()))
    }

    /// Map an SMTP reply code to a provider error (pure function)
    pub fn map_reply_code(code: u16, detail: String) -> ProviderError {
        match code {
            400..=499 => ProviderError::Deferred(detail),
            530 | 534 | 535 | 538 => ProviderError::Authentication(detail),
            501 | 510 | 511 | 550 | 551 | 553 => ProviderError::InvalidRecipient(detail),
            500..=599 => ProviderError::Refused(detail),
            _ => ProviderError::Unknown(detail),
        }
    }

    fn map_smtp_error(error: lettre::transport::smtp::Error) -> ProviderError {
        let detail = error.to_string();

        if error.is_timeout() {
            return ProviderError::Timeout(detail);
        }

        if let Some(code) = error.status() {
            if let Ok(code) = code.to_string().parse::<u16>() {
                return Self::map_reply_code(code, detail);
            }
        }

        if error.is_transient() {
            ProviderError::Deferred(detail)
        } else if error.is_permanent() {
            ProviderError::Refused(detail)
        } else if error.is_client() {
            ProviderError::Configuration(detail)
        } else if error.is_tls() {
            // Handshake failures are as often a flaky middlebox as a bad cert
            ProviderError::Network(detail)
        } else {
            ProviderError::Unknown(detail)
        }
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send_text(&self, to: &str, subject: &str, body: &str) -> Result<(), ProviderError> {
        let message = self.build_message(to, subject, body)?;
        let response = self
            .transport
            .send(message)
            .await
            .map_err(Self::map_smtp_error)?;

        debug!(code = %response.code(), "SMTP relay accepted message");
        Ok(())
    }
}
