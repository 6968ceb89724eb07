//! Live AMQP consumer session

use crate::error::SessionError;
use crate::transport::{ConsumerSession, Delivery};
use futures_util::StreamExt;
use lapin::options::{BasicAckOptions, BasicNackOptions, BasicPublishOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::{BasicProperties, Channel, Connection, Consumer};
use tracing::{debug, warn};

/// One connection, one channel, one subscription
///
/// Never shared: the consumer that receives it owns it until it is closed or
/// fails.
pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
    queue: String,
    dead_letter_queue: Option<String>,
}

impl AmqpSession {
    pub(super) fn new(
        connection: Connection,
        channel: Channel,
        consumer: Consumer,
        queue: String,
        dead_letter_queue: Option<String>,
    ) -> Self {
        Self {
            connection,
            channel,
            consumer,
            queue,
            dead_letter_queue,
        }
    }
}

/// Only a broker ack proves the dead-letter record is stored
fn check_dead_letter_confirmation(
    queue: &str,
    confirmation: &Confirmation,
) -> Result<(), SessionError> {
    let reason = match confirmation {
        Confirmation::Ack(None) => return Ok(()),
        Confirmation::Ack(Some(_)) => "broker returned the record as unroutable",
        Confirmation::Nack(_) => "broker nacked the record",
        Confirmation::NotRequested => "channel is not in confirm mode",
    };
    Err(SessionError::DeadLetterFailed {
        queue: queue.to_string(),
        reason: reason.to_string(),
    })
}

#[async_trait::async_trait]
impl ConsumerSession for AmqpSession {
    fn queue_name(&self) -> &str {
        &self.queue
    }

    fn dead_letter_queue(&self) -> Option<&str> {
        self.dead_letter_queue.as_deref()
    }

    async fn next_delivery(&mut self) -> Result<Delivery, SessionError> {
        match self.consumer.next().await {
            Some(Ok(delivery)) => Ok(Delivery {
                delivery_tag: delivery.delivery_tag,
                payload: delivery.data,
                redelivered: delivery.redelivered,
            }),
            Some(Err(e)) => Err(SessionError::Channel(e.to_string())),
            None => Err(SessionError::ChannelClosed(
                "broker closed the delivery stream".to_string(),
            )),
        }
    }

    async fn ack(&mut self, delivery_tag: u64) -> Result<(), SessionError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| SessionError::AckFailed {
                delivery_tag,
                reason: e.to_string(),
            })
    }

    async fn requeue(&mut self, delivery_tag: u64) -> Result<(), SessionError> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue: true,
                },
            )
            .await
            .map_err(|e| SessionError::RequeueFailed {
                delivery_tag,
                reason: e.to_string(),
            })
    }

    async fn publish_dead_letter(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        let Some(queue) = self.dead_letter_queue.clone() else {
            return Err(SessionError::DeadLetterFailed {
                queue: String::new(),
                reason: "no dead-letter queue configured".to_string(),
            });
        };
        let failed = |e: lapin::Error| SessionError::DeadLetterFailed {
            queue: queue.clone(),
            reason: e.to_string(),
        };

        // Persistent message on the default exchange, routed by queue name
        let properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_content_type("application/json".into());

        let confirmation = self
            .channel
            .basic_publish(
                "",
                &queue,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(failed)?
            .await
            .map_err(failed)?;

        check_dead_letter_confirmation(&queue, &confirmation)
    }

    async fn close(&mut self) {
        if let Err(e) = self.channel.close(200, "consumer shutting down").await {
            debug!(error = %e, "Channel already closed");
        }
        if let Err(e) = self.connection.close(200, "consumer shutting down").await {
            warn!(error = %e, "Broker connection did not close cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_ack_confirms_dead_letter() {
        let result = check_dead_letter_confirmation("alerts.dead", &Confirmation::Ack(None));
        assert!(result.is_ok());
    }

    #[test]
    fn test_nack_fails_dead_letter() {
        let result = check_dead_letter_confirmation("alerts.dead", &Confirmation::Nack(None));
        match result {
            Err(SessionError::DeadLetterFailed { queue, reason }) => {
                assert_eq!(queue, "alerts.dead");
                assert!(reason.contains("nacked"));
            }
            other => panic!("expected DeadLetterFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_unconfirmed_publish_fails_dead_letter() {
        assert!(matches!(
            check_dead_letter_confirmation("alerts.dead", &Confirmation::NotRequested),
            Err(SessionError::DeadLetterFailed { .. })
        ));
    }
}
