//! Delivery outcomes and provider error classification
//!
//! Every provider maps its native failures onto [`ProviderError`]; the
//! classification into transient and permanent lives here, in one place.
//! Anything not positively known to be permanent is treated as transient so
//! the broker keeps the message.

use serde::Serialize;
use thiserror::Error;

/// Result of one dispatch attempt; drives the ack decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    TransientFailure(String),
    PermanentFailure(String),
}

impl DeliveryOutcome {
    /// Outcome recorded for payloads that cannot be decoded
    pub fn malformed_payload() -> Self {
        Self::PermanentFailure("malformed payload".to_string())
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Stable label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::TransientFailure(_) => "transient_failure",
            Self::PermanentFailure(_) => "permanent_failure",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Delivered => None,
            Self::TransientFailure(reason) | Self::PermanentFailure(reason) => Some(reason),
        }
    }
}

/// Provider failures, normalized across SMTP and HTTP providers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Authentication rejected: {0}")]
    Authentication(String),

    #[error("Provider misconfigured: {0}")]
    Configuration(String),

    #[error("Recipient rejected: {0}")]
    InvalidRecipient(String),

    #[error("Message refused: {0}")]
    Refused(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Temporarily deferred: {0}")]
    Deferred(String),

    #[error("Unclassified provider error: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Whether redelivering the same message can never succeed
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_)
                | Self::Configuration(_)
                | Self::InvalidRecipient(_)
                | Self::Refused(_)
        )
    }

    pub fn classify(&self) -> DeliveryOutcome {
        let reason = crate::error::sanitize_error_message(&self.to_string());
        if self.is_permanent() {
            DeliveryOutcome::PermanentFailure(reason)
        } else {
            DeliveryOutcome::TransientFailure(reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_classes() {
        for error in [
            ProviderError::Authentication("535 bad credentials".to_string()),
            ProviderError::Configuration("unknown sender domain".to_string()),
            ProviderError::InvalidRecipient("550 5.1.1 no such user".to_string()),
            ProviderError::Refused("554 policy".to_string()),
        ] {
            assert!(
                matches!(error.classify(), DeliveryOutcome::PermanentFailure(_)),
                "{error:?} should be permanent"
            );
        }
    }

    #[test]
    fn test_transient_classes() {
        for error in [
            ProviderError::RateLimited("429".to_string()),
            ProviderError::Timeout("read timed out".to_string()),
            ProviderError::Network("connection reset".to_string()),
            ProviderError::Deferred("451 try again later".to_string()),
        ] {
            assert!(
                matches!(error.classify(), DeliveryOutcome::TransientFailure(_)),
                "{error:?} should be transient"
            );
        }
    }

    #[test]
    fn test_unknown_defaults_to_transient() {
        let outcome = ProviderError::Unknown("???".to_string()).classify();
        assert!(matches!(outcome, DeliveryOutcome::TransientFailure(_)));
    }

    #[test]
    fn test_classified_reason_is_sanitized() {
        let outcome =
            ProviderError::Authentication("login failed password=hunter2".to_string()).classify();
        let reason = outcome.reason().unwrap();

        assert!(!reason.contains("hunter2"));
        assert!(reason.starts_with("Authentication rejected"));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(DeliveryOutcome::Delivered.label(), "delivered");
        assert_eq!(
            DeliveryOutcome::TransientFailure(String::new()).label(),
            "transient_failure"
        );
        assert_eq!(DeliveryOutcome::malformed_payload().label(), "permanent_failure");
        assert_eq!(
            DeliveryOutcome::malformed_payload().reason(),
            Some("malformed payload")
        );
        assert_eq!(DeliveryOutcome::Delivered.reason(), None);
    }
}
