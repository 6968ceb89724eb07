//! Dead-letter record published for messages that can never be delivered

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope written to the dead-letter queue before the original is acked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub id: Uuid,
    pub source_queue: String,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
    pub redelivered: bool,
    /// Original payload, lossily decoded so binary garbage stays inspectable
    pub original_payload: String,
}

impl DeadLetterRecord {
    pub fn new(source_queue: &str, reason: &str, payload: &[u8], redelivered: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_queue: source_queue.to_string(),
            reason: reason.to_string(),
            failed_at: Utc::now(),
            redelivered,
            original_payload: String::from_utf8_lossy(payload).into_owned(),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
