//! Mail provider implementations

pub mod http;
pub mod smtp;

pub use http::{HttpMailConfig, HttpMailTransport};
pub use smtp::{SmtpConfig, SmtpMailTransport, SmtpTls};
