//! AMQP 0-9-1 broker adapter (RabbitMQ) built on `lapin`

pub mod connection;
pub mod session;

pub use connection::{parse_broker_url, AmqpConnectionManager, AmqpSettings};
pub use session::AmqpSession;
