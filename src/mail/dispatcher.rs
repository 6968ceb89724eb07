//! Mail dispatcher: one provider call per alert, classified

use super::{is_valid_address, DeliveryOutcome, MailTransport, Mailer};
use crate::observability::metrics::metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Production [`Mailer`] backed by a configured provider
pub struct MailDispatcher {
    transport: Arc<dyn MailTransport>,
    timeout: Duration,
}

impl MailDispatcher {
    pub fn new(transport: Arc<dyn MailTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn provider_name(&self) -> &str {
        self.transport.name()
    }
}

#[async_trait]
impl Mailer for MailDispatcher {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> DeliveryOutcome {
        if !is_valid_address(recipient) {
            return DeliveryOutcome::PermanentFailure(format!(
                "invalid recipient address: {recipient}"
            ));
        }

        let started = Instant::now();
        let result = tokio::time::timeout(
            self.timeout,
            self.transport.send_text(recipient, subject, body),
        )
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        metrics().record_dispatch_time(elapsed_ms);

        match result {
            Ok(Ok(())) => {
                debug!(
                    provider = self.transport.name(),
                    elapsed_ms, "Mail provider accepted message"
                );
                DeliveryOutcome::Delivered
            }
            Ok(Err(error)) => {
                let outcome = error.classify();
                warn!(
                    provider = self.transport.name(),
                    elapsed_ms,
                    permanent = error.is_permanent(),
                    error = %crate::error::sanitize_error_message(&error.to_string()),
                    "Mail provider rejected message"
                );
                outcome
            }
            Err(_) => {
                warn!(
                    provider = self.transport.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Mail provider call timed out"
                );
                DeliveryOutcome::TransientFailure(format!(
                    "mail provider timed out after {}ms",
                    self.timeout.as_millis()
                ))
            }
        }
    }
}
