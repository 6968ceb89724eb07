//! Error taxonomy for the notification pipeline
//!
//! Only connection- and session-level errors cross component boundaries.
//! Per-message failures (undecodable payloads, mail provider rejections) are
//! resolved inside the consumer and never surface here as `Err`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

/// Failure to establish a consumer session with the broker
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),

    #[error("Broker unreachable: {0}")]
    Unreachable(String),

    #[error("Broker authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Queue setup failed: {0}")]
    QueueSetup(String),
}

/// Failure of a live session while consuming
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Acknowledgment failed for delivery {delivery_tag}: {reason}")]
    AckFailed { delivery_tag: u64, reason: String },

    #[error("Requeue failed for delivery {delivery_tag}: {reason}")]
    RequeueFailed { delivery_tag: u64, reason: String },

    #[error("Dead-letter publish to '{queue}' failed: {reason}")]
    DeadLetterFailed { queue: String, reason: String },
}

/// Payload could not be turned into an `AlertMessage`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Payload is not valid UTF-8")]
    NotUtf8,

    #[error("Payload is not a valid alert JSON object: {0}")]
    InvalidJson(String),

    #[error("Required field missing: {0}")]
    MissingField(&'static str),

    #[error("Recipient is not a well-formed address: {0}")]
    InvalidRecipient(String),
}

/// Top-level error used by the binaries
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Broker connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Mail provider error: {0}")]
    Provider(#[from] crate::mail::ProviderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PipelineError {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

static URL_CREDENTIALS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([a-z][a-z0-9+.-]*://)[^/@\s:]+(:[^/@\s]*)?@").expect("valid regex")
});

static SECRET_ASSIGNMENTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("valid regex")
});

const MAX_SANITIZED_LEN: usize = 500;

/// Strip credentials from error text before it is logged.
///
/// Broker URLs routinely embed `user:password@`, and provider errors may echo
/// API keys back. The result is capped at 500 bytes.
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = URL_CREDENTIALS
        .replace_all(message, "${1}***@")
        .to_string();

    sanitized = SECRET_ASSIGNMENTS
        .replace_all(&sanitized, "${1}=***")
        .to_string();

    if sanitized.len() > MAX_SANITIZED_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_SANITIZED_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}
