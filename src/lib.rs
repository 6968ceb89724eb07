//! Alert Mailer
//!
//! A durable alert queue consumer that delivers notifications as email.
//!
//! # Overview
//!
//! - [`transport`]: broker abstraction and the AMQP (RabbitMQ) adapter
//! - [`consumer`]: decodes deliveries, dispatches mail, acks or requeues
//! - [`supervisor`]: reconnects with backoff whenever a session fails
//! - [`mail`]: mail dispatcher, SMTP and HTTP providers, error classification
//! - [`observability`]: logging, metrics and the health server
//!
//! A message is acknowledged only once its email was accepted, or once it is
//! known that it can never be delivered. Transient failures go back to the
//! broker.
//!
//! # Quick Start
//!
//! ```rust
//! use alert_mailer::protocol::AlertMessage;
//!
//! let payload = br#"{"email":"a@b.com","subject":"Storm Warning","body":"Severe weather approaching"}"#;
//! let alert = AlertMessage::decode(payload).unwrap();
//! assert_eq!(alert.recipient, "a@b.com");
//!
//! // Malformed payloads are a distinct, non-retryable error
//! assert!(AlertMessage::decode(b"not json").is_err());
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod mail;
pub mod observability;
pub mod protocol;
pub mod supervisor;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, PipelineConfig};
pub use consumer::{ConsumerSettings, QueueConsumer};
pub use error::{ConnectionError, DecodeError, PipelineError, PipelineResult, SessionError};
pub use mail::{DeliveryOutcome, MailDispatcher, Mailer, MailTransport, ProviderError};
pub use protocol::{AlertMessage, DeadLetterRecord};
pub use supervisor::{BackoffConfig, ConsumerSupervisor, SupervisorState};
pub use transport::{ConnectionManager, ConsumerSession, Delivery};
