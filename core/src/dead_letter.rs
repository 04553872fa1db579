//! Dead-letter storage for events that exhausted their retries.
//!
//! The dead-letter store is the last line of defense against silent loss:
//! once the retry controller gives up on a delivery, the full event payload
//! is quarantined here for operator triage and manual replay. Records are
//! never deduplicated; independent failed deliveries each leave a trace.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Error type for dead-letter operations.
///
/// A failure to write a dead-letter record is the one failure mode this
/// engine cannot recover from by itself; callers surface it loudly (error
/// logs, metrics) rather than letting the event vanish quietly.
#[derive(Debug, Error)]
pub enum DeadLetterError {
    /// Storage backend error.
    #[error("Dead letter storage error: {0}")]
    Storage(String),
}

/// Result type for dead-letter operations.
pub type Result<T> = std::result::Result<T, DeadLetterError>;

/// A quarantine entry about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDeadLetter {
    /// Stable event identity, or `"unknown"` for deliveries that could not
    /// be decoded.
    pub event_id: String,

    /// Event type string (e.g. `"PostLiked.v1"`), or the transport's claim
    /// of it for undecodable payloads.
    pub event_type: String,

    /// JSON rendering of the envelope (plus derived idempotency key), or a
    /// hex dump for undecodable payloads. Must carry enough to reconstruct
    /// the intended mutation during replay.
    pub payload: serde_json::Value,

    /// Why the event was escalated.
    pub reason: String,
}

/// A persisted quarantine entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterRecord {
    /// Surrogate key of this record.
    pub id: i64,

    /// Stable event identity as recorded.
    pub event_id: String,

    /// Event type string.
    pub event_type: String,

    /// Full payload for replay.
    pub payload: serde_json::Value,

    /// Why the event was escalated.
    pub reason: String,

    /// When the record was written.
    pub recorded_at: DateTime<Utc>,
}

/// Storage for dead-lettered events.
///
/// [`DeadLetterStore::record`] is called by the retry controller on
/// escalation; the remaining methods are the operator surface for triage
/// and manual replay (the replay process itself lives outside this
/// engine).
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of
/// `async fn` to enable trait object usage (`Arc<dyn DeadLetterStore>`),
/// which is how the handler receives its quarantine without caring about
/// the backend.
pub trait DeadLetterStore: Send + Sync {
    /// Persist one quarantine entry; returns its surrogate id.
    ///
    /// Every escalated event produces exactly one record. Entries are not
    /// deduplicated by `event_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the write fails. Callers
    /// must treat this as a loud, page-someone condition.
    fn record(
        &self,
        entry: NewDeadLetter,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>>;

    /// List the most recently quarantined events, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the query fails.
    fn list_recent(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DeadLetterRecord>>> + Send + '_>>;

    /// All records for one event identity, oldest first.
    ///
    /// Multiple records mean multiple independent failed deliveries of the
    /// same logical event.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the query fails.
    fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DeadLetterRecord>>> + Send + '_>>;

    /// Total number of quarantined records; useful for health checks.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the query fails.
    fn count(&self) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>>;
}
