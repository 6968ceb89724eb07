//! Mail dispatch
//!
//! The consumer hands every decoded alert to a [`Mailer`]. The production
//! mailer is [`MailDispatcher`], a thin wrapper over a [`MailTransport`] that
//! bounds each send with a timeout and turns provider errors into a
//! [`DeliveryOutcome`].

pub mod address;
pub mod dispatcher;
pub mod outcome;
pub mod providers;

pub use address::is_valid_address;
pub use dispatcher::MailDispatcher;
pub use outcome::{DeliveryOutcome, ProviderError};

use async_trait::async_trait;

/// Sends one alert email and reports how it went
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> DeliveryOutcome;
}

/// External mail provider
///
/// Implementations map every native failure onto a [`ProviderError`] so the
/// transient/permanent decision is made uniformly by the dispatcher.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Provider name for logs, e.g. "smtp"
    fn name(&self) -> &str;

    /// Send a plain-text email
    async fn send_text(&self, to: &str, subject: &str, body: &str) -> Result<(), ProviderError>;
}
