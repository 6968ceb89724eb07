//! What to tell the broker about a processed delivery

use crate::mail::DeliveryOutcome;

/// Broker-facing decision for one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processing finished; remove the message
    Acknowledge,
    /// Can never succeed; record it on the dead-letter queue, then remove it
    DeadLetterThenAcknowledge,
    /// Might succeed later; hand it back to the broker without acking
    Requeue,
}

/// Map a delivery outcome to a broker disposition (pure function)
///
/// A transient failure is never acknowledged.
pub fn disposition_for(outcome: &DeliveryOutcome, dead_letter_enabled: bool) -> Disposition {
    match outcome {
        DeliveryOutcome::Delivered => Disposition::Acknowledge,
        DeliveryOutcome::TransientFailure(_) => Disposition::Requeue,
        DeliveryOutcome::PermanentFailure(_) if dead_letter_enabled => {
            Disposition::DeadLetterThenAcknowledge
        }
        DeliveryOutcome::PermanentFailure(_) => Disposition::Acknowledge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivered_is_acked() {
        for dlq in [false, true] {
            assert_eq!(
                disposition_for(&DeliveryOutcome::Delivered, dlq),
                Disposition::Acknowledge
            );
        }
    }

    #[test]
    fn test_transient_is_never_acked() {
        let outcome = DeliveryOutcome::TransientFailure("rate limited".to_string());
        for dlq in [false, true] {
            assert_eq!(disposition_for(&outcome, dlq), Disposition::Requeue);
        }
    }

    #[test]
    fn test_permanent_is_dropped_or_dead_lettered() {
        let outcome = DeliveryOutcome::malformed_payload();
        assert_eq!(disposition_for(&outcome, false), Disposition::Acknowledge);
        assert_eq!(
            disposition_for(&outcome, true),
            Disposition::DeadLetterThenAcknowledge
        );
    }
}
