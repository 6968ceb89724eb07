//! Queue consumer
//!
//! Pulls deliveries from one [`ConsumerSession`] strictly one at a time,
//! decodes each into an [`AlertMessage`], hands it to the [`Mailer`], and
//! settles it with the broker according to the outcome:
//!
//! | outcome                  | broker action                               |
//! |--------------------------|---------------------------------------------|
//! | delivered                | ack                                         |
//! | permanent / undecodable  | ack (after dead-lettering, when configured) |
//! | transient                | nack with requeue, never ack                |
//!
//! Only session-level failures end the loop; per-message problems are logged
//! and settled here.

pub mod disposition;

pub use disposition::{disposition_for, Disposition};

use crate::delivery_span;
use crate::error::{sanitize_error_message, SessionError};
use crate::mail::{DeliveryOutcome, Mailer};
use crate::observability::metrics::metrics;
use crate::protocol::{AlertMessage, DeadLetterRecord};
use crate::transport::{ConsumerSession, Delivery};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

/// Resolve once shutdown has been requested
///
/// A dropped sender counts as a shutdown request: nobody is left who could
/// ever ask for one.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Consumer tuning
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Pause before a transiently failed message goes back to the broker
    pub requeue_delay: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            requeue_delay: Duration::from_millis(1000),
        }
    }
}

/// Per-consumer counters, shared across sessions
#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    delivered: AtomicU64,
    transient_failures: AtomicU64,
    permanent_failures: AtomicU64,
    decode_errors: AtomicU64,
    acked: AtomicU64,
    requeued: AtomicU64,
    dead_lettered: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsumerStatsSnapshot {
    pub received: u64,
    pub delivered: u64,
    pub transient_failures: u64,
    pub permanent_failures: u64,
    pub decode_errors: u64,
    pub acked: u64,
    pub requeued: u64,
    pub dead_lettered: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            transient_failures: self.transient_failures.load(Ordering::Relaxed),
            permanent_failures: self.permanent_failures.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }

    fn record_outcome(&self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                metrics().message_delivered();
            }
            DeliveryOutcome::TransientFailure(_) => {
                self.transient_failures.fetch_add(1, Ordering::Relaxed);
                metrics().message_transient_failure();
            }
            DeliveryOutcome::PermanentFailure(_) => {
                self.permanent_failures.fetch_add(1, Ordering::Relaxed);
                metrics().message_permanent_failure();
            }
        }
    }
}

/// Consumes alert deliveries and turns them into emails
#[derive(Clone)]
pub struct QueueConsumer {
    mailer: Arc<dyn Mailer>,
    settings: ConsumerSettings,
    stats: Arc<ConsumerStats>,
}

impl QueueConsumer {
    pub fn new(mailer: Arc<dyn Mailer>, settings: ConsumerSettings) -> Self {
        Self {
            mailer,
            settings,
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    pub fn stats(&self) -> ConsumerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Consume `session` until shutdown or a session-level failure
    ///
    /// Returns `Ok(())` only when shutdown was requested. The session is
    /// closed on every exit path.
    pub async fn run<S: ConsumerSession>(
        &self,
        mut session: S,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), SessionError> {
        info!(queue = session.queue_name(), "Consuming with manual acknowledgment");

        let result = self.consume(&mut session, shutdown).await;
        session.close().await;

        if let Err(e) = &result {
            warn!(
                queue = session.queue_name(),
                error = %sanitize_error_message(&e.to_string()),
                "Consumer session ended with error"
            );
        }
        result
    }

    async fn consume<S: ConsumerSession>(
        &self,
        session: &mut S,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), SessionError> {
        loop {
            let delivery = tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => {
                    info!("Shutdown requested, no longer accepting deliveries");
                    return Ok(());
                }
                delivery = session.next_delivery() => delivery?,
            };

            let span = delivery_span!(
                delivery_tag = delivery.delivery_tag,
                queue = session.queue_name(),
                redelivered = delivery.redelivered
            );
            self.handle_delivery(session, delivery, shutdown.clone())
                .instrument(span)
                .await?;
        }
    }

    /// Process one delivery to a terminal broker action
    async fn handle_delivery<S: ConsumerSession>(
        &self,
        session: &mut S,
        delivery: Delivery,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), SessionError> {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        metrics().message_received();

        let (outcome, decode_error) = match AlertMessage::decode(&delivery.payload) {
            Ok(alert) => {
                debug!(recipient = %alert.recipient, "Dispatching alert");
                let outcome = self
                    .mailer
                    .send(&alert.recipient, &alert.subject, &alert.body)
                    .await;
                (outcome, None)
            }
            Err(e) => {
                self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                metrics().message_decode_failed();
                warn!(error = %e, payload_bytes = delivery.payload.len(), "Undecodable alert payload");
                (DeliveryOutcome::malformed_payload(), Some(e))
            }
        };
        self.stats.record_outcome(&outcome);

        let tag = delivery.delivery_tag;
        let disposition = disposition_for(&outcome, session.dead_letter_queue().is_some());

        match disposition {
            Disposition::Acknowledge => self.acknowledge(session, tag).await?,
            Disposition::DeadLetterThenAcknowledge => {
                let reason = match &decode_error {
                    Some(e) => format!("malformed payload: {e}"),
                    None => outcome.reason().unwrap_or_default().to_string(),
                };
                self.dead_letter(session, &delivery, &reason).await?;
                self.acknowledge(session, tag).await?;
            }
            Disposition::Requeue => {
                if !*shutdown.borrow() {
                    tokio::select! {
                        _ = tokio::time::sleep(self.settings.requeue_delay) => {}
                        _ = shutdown_requested(&mut shutdown) => {}
                    }
                }
                session.requeue(tag).await?;
                self.stats.requeued.fetch_add(1, Ordering::Relaxed);
                metrics().message_requeued();
            }
        }

        log_terminal_outcome(tag, session.queue_name(), &outcome, disposition);
        Ok(())
    }

    async fn acknowledge<S: ConsumerSession>(
        &self,
        session: &mut S,
        tag: u64,
    ) -> Result<(), SessionError> {
        session.ack(tag).await?;
        self.stats.acked.fetch_add(1, Ordering::Relaxed);
        metrics().message_acked();
        Ok(())
    }

    async fn dead_letter<S: ConsumerSession>(
        &self,
        session: &mut S,
        delivery: &Delivery,
        reason: &str,
    ) -> Result<(), SessionError> {
        let record = DeadLetterRecord::new(
            session.queue_name(),
            reason,
            &delivery.payload,
            delivery.redelivered,
        );
        let payload = record
            .to_payload()
            .map_err(|e| SessionError::DeadLetterFailed {
                queue: session.dead_letter_queue().unwrap_or_default().to_string(),
                reason: format!("cannot encode record: {e}"),
            })?;

        session.publish_dead_letter(&payload).await?;
        self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
        metrics().message_dead_lettered();
        Ok(())
    }
}

fn log_terminal_outcome(
    delivery_tag: u64,
    queue: &str,
    outcome: &DeliveryOutcome,
    disposition: Disposition,
) {
    let reason = outcome.reason().unwrap_or("");
    match outcome {
        DeliveryOutcome::Delivered => info!(
            delivery_tag,
            queue,
            outcome = outcome.label(),
            disposition = ?disposition,
            "Alert delivered"
        ),
        DeliveryOutcome::TransientFailure(_) => warn!(
            delivery_tag,
            queue,
            outcome = outcome.label(),
            reason,
            disposition = ?disposition,
            "Alert left for redelivery"
        ),
        DeliveryOutcome::PermanentFailure(_) => error!(
            delivery_tag,
            queue,
            outcome = outcome.label(),
            reason,
            disposition = ?disposition,
            "Alert dropped"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::MailDispatcher;
    use crate::testing::{InMemoryBroker, MockMailTransport};
    use crate::transport::ConnectionManager;

    const STORM: &[u8] =
        br#"{"email":"a@b.com","subject":"Storm Warning","body":"Severe weather approaching"}"#;

    fn consumer(transport: Arc<MockMailTransport>) -> QueueConsumer {
        let mailer = Arc::new(MailDispatcher::new(transport, Duration::from_secs(5)));
        QueueConsumer::new(
            mailer,
            ConsumerSettings {
                requeue_delay: Duration::from_millis(10),
            },
        )
    }

    #[tokio::test]
    async fn test_delivered_message_is_acked_once() {
        let broker = InMemoryBroker::new();
        broker.publish("alerts", STORM);
        let transport = Arc::new(MockMailTransport::new());
        let consumer = consumer(transport.clone());

        let session = broker.connection_manager("alerts", None).connect().await.unwrap();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let watcher = broker.clone();
        let stopper = tokio::spawn(async move {
            assert!(watcher.wait_until(|b| b.ack_count() == 1).await);
            shutdown_tx.send(true).unwrap();
        });

        consumer.run(session, &mut shutdown_rx).await.unwrap();
        stopper.await.unwrap();

        assert_eq!(broker.ack_count(), 1);
        assert_eq!(broker.requeue_count(), 0);
        assert_eq!(transport.attempt_count().await, 1);
        assert_eq!(consumer.stats().delivered, 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_any_delivery_closes_session() {
        let broker = InMemoryBroker::new();
        let consumer = consumer(Arc::new(MockMailTransport::new()));
        let session = broker.connection_manager("alerts", None).connect().await.unwrap();

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        consumer.run(session, &mut shutdown_rx).await.unwrap();
        assert_eq!(broker.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_severed_session_surfaces_error() {
        let broker = InMemoryBroker::new();
        let consumer = consumer(Arc::new(MockMailTransport::new()));
        let session = broker.connection_manager("alerts", None).connect().await.unwrap();
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let severer = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            severer.sever_sessions();
        });

        let result = consumer.run(session, &mut shutdown_rx).await;
        assert!(matches!(result, Err(SessionError::ChannelClosed(_))));
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_counts_as_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), shutdown_requested(&mut rx))
            .await
            .unwrap();
    }
}
