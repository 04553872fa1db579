//! Delivery handling: decode, retry, escalate.
//!
//! The handler owns everything between a raw bus delivery and a settled
//! [`DeliveryOutcome`]. No error escapes it: transient projection failures
//! are retried with backoff, fatal ones escalate immediately, and whatever
//! exhausts the retry budget is quarantined in the dead-letter store before
//! the delivery is reported as handled. The transport never sees a failure
//! and never redelivers on its own.
//!
//! Deliveries that cannot even be decoded skip the retry loop entirely; a
//! payload that does not parse today will not parse tomorrow.

use crate::projector::PostProjector;
use crate::retry::RetryPolicy;
use paperboard_core::dead_letter::{DeadLetterStore, NewDeadLetter};
use paperboard_core::event::{Event, PostEventEnvelope, SerializedEvent};
use paperboard_core::projection::{DeliveryOutcome, ProjectionError, ReadModelStore};
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Settles one bus delivery into a [`DeliveryOutcome`].
///
/// # Dyn Compatibility
///
/// This trait uses an explicit `Pin<Box<dyn Future>>` return instead of
/// `async fn` to enable trait object usage (`Arc<dyn EventHandler>`), which
/// is how the worker pool dispatches deliveries without knowing the store
/// behind them.
pub trait EventHandler: Send + Sync {
    /// Handle a single delivery to completion.
    ///
    /// Infallible by contract: every failure path ends in
    /// [`DeliveryOutcome::Escalated`] after the event is quarantined.
    fn handle(
        &self,
        delivery: SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = DeliveryOutcome> + Send + '_>>;
}

/// The production [`EventHandler`]: projector plus retry plus dead-letter
/// quarantine.
pub struct ProjectionEventHandler<S: ReadModelStore> {
    projector: PostProjector<S>,
    dead_letters: Arc<dyn DeadLetterStore>,
    policy: RetryPolicy,
}

impl<S: ReadModelStore> ProjectionEventHandler<S> {
    /// Create a handler with the default retry policy.
    #[must_use]
    pub fn new(projector: PostProjector<S>, dead_letters: Arc<dyn DeadLetterStore>) -> Self {
        Self::with_policy(projector, dead_letters, RetryPolicy::default())
    }

    /// Create a handler with an explicit retry policy.
    #[must_use]
    pub const fn with_policy(
        projector: PostProjector<S>,
        dead_letters: Arc<dyn DeadLetterStore>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            projector,
            dead_letters,
            policy,
        }
    }

    /// The retry policy in effect.
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn deliver(&self, delivery: SerializedEvent) -> DeliveryOutcome {
        let envelope = match PostEventEnvelope::from_serialized(&delivery) {
            Ok(envelope) => envelope,
            Err(error) => return self.quarantine_undecodable(&delivery, &error.to_string()).await,
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.projector.project(&envelope).await {
                Ok(outcome) => return outcome.into(),
                Err(error) => {
                    if error.is_transient() && !self.policy.is_final_attempt(attempt) {
                        let delay = self.policy.delay_after_attempt(attempt);
                        tracing::warn!(
                            event_id = %envelope.event_id,
                            event_type = envelope.event_type(),
                            attempt,
                            delay_ms = delay.as_millis(),
                            error = %error,
                            "Projection failed, retrying"
                        );
                        metrics::counter!(
                            "read_model.projection.retries",
                            "event_type" => envelope.event_type()
                        )
                        .increment(1);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return self.escalate(&envelope, attempt, &error).await;
                }
            }
        }
    }

    /// Quarantine an envelope whose projection gave up, then report the
    /// delivery as handled.
    async fn escalate(
        &self,
        envelope: &PostEventEnvelope,
        attempt: u32,
        error: &ProjectionError,
    ) -> DeliveryOutcome {
        tracing::error!(
            event_id = %envelope.event_id,
            event_type = envelope.event_type(),
            attempt,
            error = %error,
            "Delivery escalated to dead letter store"
        );

        let entry = NewDeadLetter {
            event_id: envelope.event_id.to_string(),
            event_type: envelope.event_type().to_string(),
            payload: envelope_payload(envelope),
            reason: error.to_string(),
        };
        self.record_dead_letter(entry).await;

        metrics::counter!(
            "read_model.projection.escalated",
            "event_type" => envelope.event_type()
        )
        .increment(1);

        DeliveryOutcome::Escalated
    }

    /// Quarantine a delivery that could not be decoded. The raw bytes are
    /// preserved as hex so an operator can still inspect and replay them.
    async fn quarantine_undecodable(
        &self,
        delivery: &SerializedEvent,
        reason: &str,
    ) -> DeliveryOutcome {
        tracing::error!(
            event_type = %delivery.event_type,
            size_bytes = delivery.data.len(),
            reason,
            "Undecodable delivery escalated to dead letter store"
        );

        let entry = NewDeadLetter {
            event_id: "unknown".to_string(),
            event_type: delivery.event_type.clone(),
            payload: json!({
                "raw_event_hex": hex_dump(&delivery.data),
                "size_bytes": delivery.data.len(),
                "metadata": delivery.metadata,
            }),
            reason: reason.to_string(),
        };
        self.record_dead_letter(entry).await;

        metrics::counter!(
            "read_model.projection.escalated",
            "event_type" => delivery.event_type.clone()
        )
        .increment(1);

        DeliveryOutcome::Escalated
    }

    /// Write a dead-letter record, surfacing failures loudly.
    ///
    /// A failed write here means the event is lost unless the operator acts
    /// on the logs, so this is the one place that logs at error level with
    /// the full payload attached. The delivery outcome stays `Escalated`
    /// either way; rethrowing would put the poison event back on the bus.
    async fn record_dead_letter(&self, entry: NewDeadLetter) {
        if let Err(error) = self.dead_letters.record(entry.clone()).await {
            tracing::error!(
                event_id = %entry.event_id,
                event_type = %entry.event_type,
                payload = %entry.payload,
                reason = %entry.reason,
                error = %error,
                "Failed to write dead letter record, event is only preserved in this log line"
            );
            metrics::counter!(
                "read_model.dlq.write_failures",
                "event_type" => entry.event_type.clone()
            )
            .increment(1);
        }
    }
}

impl<S: ReadModelStore> EventHandler for ProjectionEventHandler<S> {
    fn handle(
        &self,
        delivery: SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = DeliveryOutcome> + Send + '_>> {
        Box::pin(self.deliver(delivery))
    }
}

/// JSON payload for a decoded envelope: the envelope itself plus the derived
/// idempotency key, which is enough to rebuild and replay the exact mutation.
fn envelope_payload(envelope: &PostEventEnvelope) -> serde_json::Value {
    let envelope_json = serde_json::to_value(envelope)
        .unwrap_or_else(|error| json!({ "serialization_error": error.to_string() }));
    json!({
        "envelope": envelope_json,
        "idempotency_key": envelope.idempotency_key(),
    })
}

fn hex_dump(data: &[u8]) -> String {
    data.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_dump_formats_bytes() {
        assert_eq!(hex_dump(&[0x00, 0xff, 0x13]), "00ff13");
        assert_eq!(hex_dump(&[]), "");
    }
}
