//! # Paperboard Worker
//!
//! Deployable wiring for the read-model projection pipeline.
//!
//! The library half of this crate is the assembly and lifecycle layer:
//! [`Config`] loads settings from environment variables and [`Application`]
//! wires the event bus subscription, the retrying handler, and the bounded
//! worker pool, then coordinates graceful shutdown. The `demo` binary
//! drives the full pipeline end to end over the in-memory backends:
//!
//! ```bash
//! cargo run -p paperboard-worker --bin demo
//! ```
//!
//! A production deployment supplies the durable pieces instead: a
//! broker-backed [`EventBus`](paperboard_core::event_bus::EventBus)
//! implementation and the Postgres stores from `paperboard-postgres`.

pub mod config;
pub mod lifecycle;

// Re-export commonly used items
pub use config::Config;
pub use lifecycle::{Application, shutdown_signal};
