//! # Paperboard Testing
//!
//! Testing utilities and in-memory backends for the Paperboard read-model
//! engine.
//!
//! This crate provides:
//! - [`InMemoryReadModelStore`]: transactional read-model storage without a
//!   database
//! - [`InMemoryEventBus`]: broadcast-backed transport for end-to-end tests
//! - [`InMemoryDeadLetterStore`]: quarantine with assertion accessors
//! - [`FlakyReadModelStore`] / [`FailingDeadLetterStore`]: failure injection
//! - [`FixedClock`]: deterministic time
//!
//! ## Example
//!
//! ```ignore
//! use paperboard_testing::{test_clock, InMemoryDeadLetterStore, InMemoryReadModelStore};
//!
//! #[tokio::test]
//! async fn likes_are_idempotent() {
//!     let store = InMemoryReadModelStore::new();
//!     let dead_letters = InMemoryDeadLetterStore::new();
//!     let projector = PostProjector::with_clock(store.clone(), Arc::new(test_clock()));
//!
//!     projector.project(&envelope).await.unwrap();
//!     projector.project(&envelope).await.unwrap();
//!
//!     assert_eq!(store.post(post_id).await.unwrap().like_count, 1);
//! }
//! ```

pub mod clock;
pub mod dead_letter;
pub mod event_bus;
pub mod read_model;

// Re-export commonly used items
pub use clock::{FixedClock, test_clock};
pub use dead_letter::{FailingDeadLetterStore, InMemoryDeadLetterStore};
pub use event_bus::InMemoryEventBus;
pub use read_model::{FlakyReadModelStore, InMemoryReadModelStore, InMemoryReadModelTx};
