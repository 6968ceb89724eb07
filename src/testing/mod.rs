//! Testing utilities and mock implementations
//!
//! An in-memory broker with real acknowledgment semantics and a scripted
//! mail transport, so the pipeline can be exercised without RabbitMQ or an
//! SMTP server.

pub mod broker;
pub mod mocks;

pub use broker::{InMemoryBroker, InMemoryConnectionManager, InMemorySession};
pub use mocks::*;
