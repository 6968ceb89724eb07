//! Broker transport abstraction
//!
//! A [`ConnectionManager`] performs exactly one connection attempt and hands
//! back a [`ConsumerSession`]: a live subscription to one durable queue.
//! Retry and backoff live in the supervisor, never here.
//!
//! # Example
//!
//! ```rust
//! use alert_mailer::testing::InMemoryBroker;
//! use alert_mailer::transport::{ConnectionManager, ConsumerSession};
//!
//! # tokio_test::block_on(async {
//! let broker = InMemoryBroker::new();
//! broker.publish("alerts", br#"{"email":"a@b.com","subject":"s","body":"b"}"#);
//!
//! let mut session = broker.connection_manager("alerts", None).connect().await.unwrap();
//! let delivery = session.next_delivery().await.unwrap();
//! session.ack(delivery.delivery_tag).await.unwrap();
//! assert_eq!(broker.ack_count(), 1);
//! # });
//! ```

use crate::error::{ConnectionError, SessionError};

pub mod amqp;

pub use amqp::{AmqpConnectionManager, AmqpSession, AmqpSettings};

/// One message pushed by the broker, not yet acknowledged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Broker-assigned tag, unique within the session's channel
    pub delivery_tag: u64,
    pub payload: Vec<u8>,
    /// Set when the broker has handed this message out before
    pub redelivered: bool,
}

/// Exclusively owned subscription to a durable queue
///
/// A session is consumed by one consumer at a time; any `Err` returned from
/// these methods means the session is dead and must be replaced.
#[async_trait::async_trait]
pub trait ConsumerSession: Send {
    /// Queue this session consumes from
    fn queue_name(&self) -> &str;

    /// Dead-letter queue, when one was declared for this session
    fn dead_letter_queue(&self) -> Option<&str>;

    /// Wait for the next delivery. Must be cancel-safe: dropping the future
    /// before it resolves must not lose a message.
    async fn next_delivery(&mut self) -> Result<Delivery, SessionError>;

    /// Acknowledge a delivery as fully processed
    async fn ack(&mut self, delivery_tag: u64) -> Result<(), SessionError>;

    /// Hand a delivery back to the broker for redelivery
    async fn requeue(&mut self, delivery_tag: u64) -> Result<(), SessionError>;

    /// Publish a record to the dead-letter queue
    async fn publish_dead_letter(&mut self, payload: &[u8]) -> Result<(), SessionError>;

    /// Close the session and release broker-side resources
    async fn close(&mut self);
}

/// Establishes consumer sessions against a broker
#[async_trait::async_trait]
pub trait ConnectionManager: Send + Sync {
    type Session: ConsumerSession + 'static;

    /// One connection attempt: connect, declare the durable queue
    /// (idempotent), and subscribe with manual acknowledgment.
    async fn connect(&self) -> Result<Self::Session, ConnectionError>;
}
