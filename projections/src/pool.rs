//! Bounded worker pool driving projections from the event bus.
//!
//! The pool subscribes to a topic, pulls deliveries off the stream, and
//! hands each one to the [`EventHandler`](crate::handler::EventHandler) in
//! its own task. A semaphore caps the number of in-flight deliveries;
//! intake stalls when every permit is taken, which is the backpressure
//! toward the bus. Nothing here preserves ordering: two deliveries for the
//! same post can run concurrently, which is exactly why the projector's
//! mutations are atomic deltas instead of read-modify-write.
//!
//! Retry backoff runs inside the worker task, so a delivery in backoff
//! occupies its permit for the whole wait. Size `max_in_flight` with that
//! in mind.

use crate::handler::EventHandler;
use futures::StreamExt;
use paperboard_core::event_bus::EventBus;
use paperboard_core::projection::{ProjectionError, Result};
use std::sync::Arc;
use tokio::sync::{Semaphore, watch};

/// Default cap on concurrently processed deliveries.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Pulls deliveries from one topic and settles them concurrently.
///
/// Created together with its shutdown handle:
///
/// ```ignore
/// let (mut pool, shutdown) = ProjectionWorkerPool::new(bus, handler, "post-events");
/// let task = tokio::spawn(async move { pool.start().await });
///
/// // ... later ...
/// shutdown.send(true)?;
/// task.await??;
/// ```
///
/// On shutdown the pool stops intake first, then waits for every in-flight
/// delivery to settle before returning. Dropping the shutdown sender also
/// stops the pool.
pub struct ProjectionWorkerPool {
    event_bus: Arc<dyn EventBus>,
    handler: Arc<dyn EventHandler>,
    topic: String,
    max_in_flight: usize,
    shutdown: watch::Receiver<bool>,
}

impl ProjectionWorkerPool {
    /// Create a worker pool and its shutdown sender.
    #[must_use]
    pub fn new(
        event_bus: Arc<dyn EventBus>,
        handler: Arc<dyn EventHandler>,
        topic: impl Into<String>,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        (
            Self {
                event_bus,
                handler,
                topic: topic.into(),
                max_in_flight: DEFAULT_MAX_IN_FLIGHT,
                shutdown: shutdown_rx,
            },
            shutdown_tx,
        )
    }

    /// Set the cap on concurrently processed deliveries (floored at 1).
    #[must_use]
    pub const fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = if max_in_flight == 0 { 1 } else { max_in_flight };
        self
    }

    /// The topic this pool consumes.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Run the pool until shutdown is signaled.
    ///
    /// Consumes deliveries until the shutdown flag flips, then drains: no
    /// new deliveries are accepted and the call returns once every spawned
    /// worker has settled its delivery.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Transient`] if subscribing to the topic
    /// fails. Individual delivery failures never surface here; the handler
    /// settles them internally.
    #[allow(clippy::cognitive_complexity)]
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(
            topic = %self.topic,
            max_in_flight = self.max_in_flight,
            "Starting projection worker pool"
        );

        let mut event_stream = self.event_bus.subscribe(&[&self.topic]).await.map_err(|e| {
            ProjectionError::Transient(format!("Failed to subscribe to {}: {e}", self.topic))
        })?;

        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));

        while !*self.shutdown.borrow() {
            tokio::select! {
                Some(event_result) = event_stream.next() => {
                    match event_result {
                        Ok(delivery) => {
                            // Intake blocks here when the pool is full.
                            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                break;
                            };
                            let handler = Arc::clone(&self.handler);
                            tokio::spawn(async move {
                                let outcome = handler.handle(delivery).await;
                                tracing::debug!(outcome = outcome.as_str(), "Delivery settled");
                                drop(permit);
                            });
                        }
                        Err(e) => {
                            tracing::error!(
                                topic = %self.topic,
                                error = %e,
                                "Error receiving event from bus"
                            );
                        }
                    }
                }
                changed = self.shutdown.changed() => {
                    // A dropped sender counts as a shutdown signal.
                    if changed.is_err() || *self.shutdown.borrow() {
                        tracing::info!(topic = %self.topic, "Shutdown signal received");
                        break;
                    }
                }
            }
        }

        drop(event_stream);
        self.drain(&semaphore).await;

        tracing::info!(topic = %self.topic, "Projection worker pool stopped");
        Ok(())
    }

    /// Wait for all in-flight deliveries to settle.
    async fn drain(&self, semaphore: &Arc<Semaphore>) {
        #[allow(clippy::cast_possible_truncation)]
        let all_permits = self.max_in_flight as u32;
        if semaphore.acquire_many(all_permits).await.is_ok() {
            tracing::debug!(topic = %self.topic, "All in-flight deliveries settled");
        }
    }
}
