//! Projection pipeline for Paperboard read models.
//!
//! # Overview
//!
//! This crate turns bus deliveries into read-model state, one idempotent
//! transaction at a time:
//! - **`PostProjector`**: claims the delivery's idempotency key and applies
//!   the mutation in a single transaction
//! - **`ProjectionEventHandler`**: retries transient failures with backoff
//!   and quarantines what gives up into the dead-letter store
//! - **`ProjectionWorkerPool`**: bounded concurrent dispatch from the bus,
//!   with graceful drain on shutdown
//!
//! The pipeline assumes nothing about delivery order or count. At-least-once
//! delivery in, at-most-once application out:
//!
//! ```text
//! Event Bus → Worker Pool → Handler (retry/DLQ) → Projector (claim+apply)
//! ```
//!
//! # Wiring
//!
//! ```ignore
//! use paperboard_projections::{PostProjector, ProjectionEventHandler, ProjectionWorkerPool};
//! use std::sync::Arc;
//!
//! let projector = PostProjector::new(store);
//! let handler = Arc::new(ProjectionEventHandler::new(projector, dead_letters));
//! let (mut pool, shutdown) = ProjectionWorkerPool::new(bus, handler, "post-events");
//!
//! tokio::spawn(async move { pool.start().await });
//! ```
//!
//! Storage lives elsewhere: `paperboard-postgres` for production,
//! `paperboard-testing` for deterministic in-memory backends. This crate only
//! talks to the `ReadModelStore` and `DeadLetterStore` traits.

pub mod handler;
pub mod pool;
pub mod projector;
pub mod retry;

// Re-export main types for convenience
pub use handler::{EventHandler, ProjectionEventHandler};
pub use pool::ProjectionWorkerPool;
pub use projector::PostProjector;
pub use retry::RetryPolicy;
