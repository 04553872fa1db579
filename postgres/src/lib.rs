//! `PostgreSQL` storage for the Paperboard read-model engine.
//!
//! This crate provides the production storage backends behind the traits in
//! `paperboard-core`:
//!
//! - [`PostgresReadModelStore`]: denormalized post rows plus the
//!   processed-event ledger, mutated claim-and-apply in one transaction
//! - [`PostgresDeadLetterStore`]: quarantine for events that exhausted
//!   their retries
//!
//! # Example
//!
//! ```ignore
//! use paperboard_postgres::{PostgresDeadLetterStore, PostgresReadModelStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresReadModelStore::new("postgres://localhost/paperboard_read").await?;
//!     store.migrate().await?;
//!
//!     let dead_letters = PostgresDeadLetterStore::new(store.pool().clone());
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dead_letter;
pub mod read_model;

pub use dead_letter::PostgresDeadLetterStore;
pub use read_model::{PostgresReadModelStore, PostgresReadModelTx};
