//! Event bus abstraction between the write side and the read-model engine.
//!
//! This module provides the [`EventBus`] trait for publishing and subscribing
//! to post events. The write side publishes one envelope per aggregate
//! mutation on successful commit; the projection worker pool subscribes and
//! keeps the read model in sync.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │   Write side     │
//! │  (post CRUD)     │
//! └────────┬─────────┘
//!          │ one envelope per mutation
//!          ▼
//! ┌──────────────────┐
//! │    Event Bus     │◄─── At-least-once delivery, no ordering
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │ Projection pool  │
//! │ (bounded workers)│
//! └──────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - **At-least-once delivery**: events may be delivered multiple times
//! - **No ordering guarantee**: not even for events of the same post
//! - **Idempotency downstream**: subscribers deduplicate via the ledger
//!
//! # Topic Naming Convention
//!
//! Topics follow the pattern `{aggregate-type}-events`; the engine consumes
//! `post-events`.
//!
//! # Example
//!
//! ```rust,ignore
//! use paperboard_core::event_bus::EventBus;
//! use futures::StreamExt;
//!
//! async fn example(bus: &dyn EventBus) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut stream = bus.subscribe(&["post-events"]).await?;
//!     while let Some(result) = stream.next().await {
//!         match result {
//!             Ok(event) => println!("Received: {}", event.event_type),
//!             Err(e) => eprintln!("Stream error: {e}"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use crate::event::SerializedEvent;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Failed to deserialize an event
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Generic error for other failures
    #[error("Event bus error: {0}")]
    Other(String),
}

/// Stream of events from subscriptions.
///
/// Each item is a `Result` that carries either a delivery or a transport
/// error; consumers log errors and keep reading.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SerializedEvent, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// Provides publish/subscribe with at-least-once delivery semantics. The
/// production transport lives outside this repository; the in-repo
/// implementation is the in-memory bus used by tests and the demo worker.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to support concurrent access
/// from publishers and the worker pool.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of
/// `async fn` to enable trait object usage (`Arc<dyn EventBus>`), which is
/// how the worker pool receives its transport.
pub trait EventBus: Send + Sync {
    /// Publish an event to a topic.
    ///
    /// Events are published with at-least-once semantics; subscribers must
    /// tolerate duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish operation
    /// fails.
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics and receive a stream of events.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
