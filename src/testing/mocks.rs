//! Mock mail transport

use crate::mail::{MailTransport, ProviderError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;

/// A message the mock transport accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mail transport that records sends and replays scripted failures
///
/// Results pushed with [`push_result`](Self::push_result) are consumed one
/// per call, in order; once they run out every send succeeds. Recipients
/// registered with [`fail_recipient`](Self::fail_recipient) always fail.
#[derive(Debug, Default)]
pub struct MockMailTransport {
    sent: Mutex<Vec<SentMail>>,
    attempts: Mutex<Vec<String>>,
    scripted: Mutex<VecDeque<Result<(), ProviderError>>>,
    failing_recipients: Mutex<HashMap<String, ProviderError>>,
    delay: Option<Duration>,
}

impl MockMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send sleeps this long first
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn push_result(&self, result: Result<(), ProviderError>) {
        self.scripted.lock().await.push_back(result);
    }

    pub async fn fail_recipient(&self, recipient: &str, error: ProviderError) {
        self.failing_recipients
            .lock()
            .await
            .insert(recipient.to_string(), error);
    }

    /// Successfully sent messages, in order
    pub async fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().await.clone()
    }

    /// Number of send calls, successful or not
    pub async fn attempt_count(&self) -> usize {
        self.attempts.lock().await.len()
    }

    /// Recipients of every send call, in order
    pub async fn attempted_recipients(&self) -> Vec<String> {
        self.attempts.lock().await.clone()
    }
}

#[async_trait]
impl MailTransport for MockMailTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send_text(&self, to: &str, subject: &str, body: &str) -> Result<(), ProviderError> {
        self.attempts.lock().await.push(to.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.failing_recipients.lock().await.get(to) {
            return Err(error.clone());
        }

        self.scripted.lock().await.pop_front().unwrap_or(Ok(()))?;

        self.sent.lock().await.push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
