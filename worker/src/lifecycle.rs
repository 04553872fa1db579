//! Worker lifecycle management and graceful shutdown.
//!
//! This module provides the [`Application`] struct that manages the complete
//! lifecycle of the projection worker:
//!
//! 1. **Startup**: assemble projector, retry handler, and worker pool, then
//!    spawn the pool as a background task
//! 2. **Runtime**: consume the post-events topic until a shutdown signal
//! 3. **Shutdown**: stop intake, drain in-flight deliveries, clean exit
//!
//! # Graceful Shutdown
//!
//! When a shutdown signal is received (Ctrl+C or SIGTERM):
//! 1. The shutdown flag flips; the pool stops pulling from the bus
//! 2. In-flight deliveries get `PROJECTION_SHUTDOWN_TIMEOUT` seconds to
//!    settle
//! 3. Anything still unsettled is abandoned to the transport's redelivery
//!
//! # Example
//!
//! ```rust,ignore
//! let config = Config::from_env();
//! let app = Application::start(&config, bus, store, dead_letters);
//! app.run().await?;
//! ```

use crate::config::Config;
use paperboard_core::dead_letter::DeadLetterStore;
use paperboard_core::event_bus::EventBus;
use paperboard_core::projection::{ReadModelStore, Result as ProjectionResult};
use paperboard_projections::{PostProjector, ProjectionEventHandler, ProjectionWorkerPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A running projection worker.
///
/// Owns the spawned worker pool task and the shutdown handle that stops it.
/// Dropping the value without calling [`Application::stop`] drops the
/// shutdown sender, which the pool also treats as a stop signal; the drain
/// is only awaited on the explicit paths.
pub struct Application {
    /// Flips to `true` to stop pool intake
    shutdown: watch::Sender<bool>,

    /// The worker pool task, running until shutdown
    pool_task: JoinHandle<ProjectionResult<()>>,

    /// How long [`Application::stop`] waits for the drain
    drain_timeout: Duration,
}

impl Application {
    /// Assemble the projection pipeline and start consuming.
    ///
    /// The store type is generic so the same wiring serves the in-memory
    /// demo and a Postgres deployment; the bus and dead-letter store come
    /// in as trait objects because the pool and handler hold them that way.
    #[must_use]
    pub fn start<S>(
        config: &Config,
        event_bus: Arc<dyn EventBus>,
        store: S,
        dead_letters: Arc<dyn DeadLetterStore>,
    ) -> Self
    where
        S: ReadModelStore + 'static,
    {
        let projector = PostProjector::new(store);
        let handler = Arc::new(ProjectionEventHandler::with_policy(
            projector,
            dead_letters,
            config.retry_policy(),
        ));

        let (pool, shutdown) =
            ProjectionWorkerPool::new(event_bus, handler, config.bus.topic.clone());
        let mut pool = pool.with_max_in_flight(config.pool.max_in_flight);

        info!(
            topic = %pool.topic(),
            max_in_flight = config.pool.max_in_flight,
            "Starting projection worker"
        );
        let pool_task = tokio::spawn(async move { pool.start().await });

        Self {
            shutdown,
            pool_task,
            drain_timeout: config.shutdown_timeout(),
        }
    }

    /// Run until a shutdown signal arrives, then drain and return.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker pool failed to subscribe or its task
    /// panicked.
    pub async fn run(self) -> anyhow::Result<()> {
        shutdown_signal().await;
        self.stop().await
    }

    /// Stop intake, wait for in-flight deliveries to settle, and return.
    ///
    /// A drain that exceeds the configured timeout logs a warning and still
    /// returns `Ok`: unsettled deliveries were never claimed, so the
    /// transport redelivers them to the next worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker pool failed to subscribe or its task
    /// panicked.
    pub async fn stop(self) -> anyhow::Result<()> {
        info!("Initiating graceful shutdown");
        let _ = self.shutdown.send(true);

        match tokio::time::timeout(self.drain_timeout, self.pool_task).await {
            Ok(Ok(Ok(()))) => {
                info!("Graceful shutdown complete");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(anyhow::anyhow!("Projection worker pool failed: {e}")),
            Ok(Err(e)) => Err(anyhow::anyhow!("Projection worker pool task panicked: {e}")),
            Err(_) => {
                warn!(
                    timeout_secs = self.drain_timeout.as_secs(),
                    "Shutdown timed out before the pool drained"
                );
                Ok(())
            }
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// Returns when the process receives SIGINT (Ctrl+C) or SIGTERM.
///
/// # Panics
///
/// Panics if the signal handlers cannot be installed.
#[allow(clippy::expect_used)] // Without signal handlers there is no way to observe shutdown.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{BusConfig, PoolConfig, RetryConfig};
    use paperboard_core::event::{PostEvent, PostEventEnvelope};
    use paperboard_core::types::{AuthorId, PostId};
    use paperboard_testing::{InMemoryDeadLetterStore, InMemoryEventBus, InMemoryReadModelStore};

    const TOPIC: &str = "post-events";

    fn config() -> Config {
        Config {
            bus: BusConfig {
                topic: TOPIC.to_string(),
            },
            pool: PoolConfig {
                max_in_flight: 4,
                shutdown_timeout: 5,
            },
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 5,
                max_delay_ms: 50,
                multiplier: 2.0,
            },
        }
    }

    async fn wait_for_subscription(bus: &InMemoryEventBus) {
        for _ in 0..200 {
            if bus.subscriber_count(TOPIC) > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(
            bus.subscriber_count(TOPIC) > 0,
            "worker pool never subscribed to {TOPIC}"
        );
    }

    #[tokio::test]
    async fn application_projects_a_published_event() {
        let bus = InMemoryEventBus::new();
        let store = InMemoryReadModelStore::new();
        let dead_letters = InMemoryDeadLetterStore::new();

        let app = Application::start(
            &config(),
            Arc::new(bus.clone()),
            store.clone(),
            Arc::new(dead_letters.clone()),
        );
        wait_for_subscription(&bus).await;

        let envelope = PostEventEnvelope::new(PostEvent::PostCreated {
            post_id: PostId::new(1),
            title: "Hello".to_string(),
            author_id: AuthorId::new(1),
            author_name: "mina".to_string(),
            created_at: chrono::Utc::now(),
            idempotency_key: "post-create:1".to_string(),
        });
        bus.publish(TOPIC, &envelope.to_serialized().unwrap())
            .await
            .unwrap();

        let mut created = false;
        for _ in 0..500 {
            if store.post(PostId::new(1)).await.is_some() {
                created = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(created, "published event never reached the read model");

        app.stop().await.unwrap();
        assert!(dead_letters.is_empty());
    }

    #[tokio::test]
    async fn stop_without_traffic_returns_cleanly() {
        let bus = InMemoryEventBus::new();
        let app = Application::start(
            &config(),
            Arc::new(bus.clone()),
            InMemoryReadModelStore::new(),
            Arc::new(InMemoryDeadLetterStore::new()),
        );
        wait_for_subscription(&bus).await;

        app.stop().await.unwrap();
    }
}
