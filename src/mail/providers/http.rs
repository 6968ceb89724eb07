//! HTTP mail API provider
//!
//! Posts a JSON document `{from, to, subject, text}` to a transactional mail
//! endpoint with bearer authentication, the shape most hosted mail APIs
//! accept.

use crate::mail::{MailTransport, ProviderError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// HTTP mail provider configuration
#[derive(Debug, Clone)]
pub struct HttpMailConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub from: String,
    pub timeout: Duration,
}

impl Default for HttpMailConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            from: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Mail transport backed by an HTTP JSON API
pub struct HttpMailTransport {
    config: HttpMailConfig,
    client: Client,
}

impl HttpMailTransport {
    pub fn new(config: HttpMailConfig) -> Result<Self, ProviderError> {
        if config.endpoint.is_empty() {
            return Err(ProviderError::Configuration(
                "HTTP mail endpoint is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Map a non-success HTTP status to a provider error (pure function)
    pub fn map_status(status: StatusCode, body: &str) -> ProviderError {
        let detail = format!("{status} - {body}");
        match status.as_u16() {
            401 | 403 => ProviderError::Authentication(detail),
            404 | 405 => ProviderError::Configuration(detail),
            408 => ProviderError::Timeout(detail),
            429 => ProviderError::RateLimited(detail),
            400 | 422 if mentions_recipient(body) => ProviderError::InvalidRecipient(detail),
            400 | 413 | 422 => ProviderError::Refused(detail),
            500..=599 => ProviderError::Deferred(detail),
            _ => ProviderError::Unknown(detail),
        }
    }

    fn map_request_error(error: reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            ProviderError::Timeout(error.to_string())
        } else if error.is_connect() || error.is_request() {
            ProviderError::Network(error.to_string())
        } else if error.is_builder() {
            ProviderError::Configuration(error.to_string())
        } else {
            ProviderError::Unknown(error.to_string())
        }
    }
}

fn mentions_recipient(body: &str) -> bool {
    let body = body.to_lowercase();
    ["recipient", "\"to\"", "email address", "invalid address"]
        .iter()
        .any(|needle| body.contains(needle))
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send_text(&self, to: &str, subject: &str, body: &str) -> Result<(), ProviderError> {
        let request = SendRequest {
            from: &self.config.from,
            to,
            subject,
            text: body,
        };

        let mut builder = self.client.post(&self.config.endpoint).json(&request);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(Self::map_request_error)?;
        let status = response.status();

        if status.is_success() {
            debug!(status = %status, "HTTP mail API accepted message");
            return Ok(());
        }

        let error_text = response.text().await.unwrap_or_default();
        Err(Self::map_status(status, &error_text))
    }
}
