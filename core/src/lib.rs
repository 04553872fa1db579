//! # Paperboard Core
//!
//! Core events, traits and types for the Paperboard read-model engine.
//!
//! This crate defines the contract between the event transport and the
//! denormalized read side: domain events arrive at least once and in no
//! particular order, and the projection machinery turns them into exactly-once
//! *effects* on the read model.
//!
//! ## Core Concepts
//!
//! - **Event**: An immutable fact about a post (`PostCreated`, `PostLiked`, ...)
//! - **Envelope**: An event plus its stable publish-time identity
//! - **Idempotency key**: The claim that makes redelivered events no-ops
//! - **Read model store**: Transactional storage where claim and mutation commit together
//! - **Dead letter store**: Quarantine for events that exhausted their retries
//!
//! ## Delivery Guarantees
//!
//! - At-least-once delivery in, at-most-once application out
//! - No ordering assumptions, not even per post
//! - Counter mutations are atomic deltas, never read-modify-write
//!
//! ## Example
//!
//! ```ignore
//! use paperboard_core::event::{PostEvent, PostEventEnvelope};
//! use paperboard_core::types::{AuthorId, PostId};
//!
//! // A producer publishes an envelope; the identity is minted exactly once.
//! let envelope = PostEventEnvelope::new(PostEvent::PostLiked {
//!     post_id: PostId::new(42),
//!     idempotency_key: "like:42:alice".to_string(),
//! });
//!
//! // A projector claims the key and applies the delta in one transaction.
//! let outcome = projector.project(&envelope).await?;
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod dead_letter;
pub mod environment;
pub mod event;
pub mod event_bus;
pub mod projection;
pub mod types;
