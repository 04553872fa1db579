//! In-memory dead-letter stores for tests.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use chrono::Utc;
use paperboard_core::dead_letter::{
    DeadLetterError, DeadLetterRecord, DeadLetterStore, NewDeadLetter, Result,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// In-memory dead-letter store that keeps records in insertion order.
///
/// # Example
///
/// ```
/// use paperboard_testing::InMemoryDeadLetterStore;
/// use paperboard_core::dead_letter::{DeadLetterStore, NewDeadLetter};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryDeadLetterStore::new();
///
/// store.record(NewDeadLetter {
///     event_id: "evt-1".to_string(),
///     event_type: "PostLiked.v1".to_string(),
///     payload: serde_json::json!({"post_id": 1}),
///     reason: "retries exhausted".to_string(),
/// }).await?;
///
/// assert_eq!(store.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryDeadLetterStore {
    records: Arc<Mutex<Vec<DeadLetterRecord>>>,
}

impl InMemoryDeadLetterStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Number of quarantined records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Check if no records have been quarantined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }

    /// Clear all records (for test isolation).
    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }
}

impl DeadLetterStore for InMemoryDeadLetterStore {
    fn record(
        &self,
        entry: NewDeadLetter,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
        Box::pin(async move {
            let mut records = self.records.lock().unwrap();
            #[allow(clippy::cast_possible_wrap)] // Test volumes stay tiny
            let id = records.len() as i64 + 1;
            records.push(DeadLetterRecord {
                id,
                event_id: entry.event_id,
                event_type: entry.event_type,
                payload: entry.payload,
                reason: entry.reason,
                recorded_at: Utc::now(),
            });
            Ok(id)
        })
    }

    fn list_recent(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DeadLetterRecord>>> + Send + '_>> {
        Box::pin(async move {
            let records = self.records.lock().unwrap();
            Ok(records.iter().rev().take(limit).cloned().collect())
        })
    }

    fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DeadLetterRecord>>> + Send + '_>> {
        let event_id = event_id.to_string();
        Box::pin(async move {
            let records = self.records.lock().unwrap();
            Ok(records
                .iter()
                .filter(|r| r.event_id == event_id)
                .cloned()
                .collect())
        })
    }

    fn count(&self) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
        Box::pin(async move {
            #[allow(clippy::cast_possible_wrap)] // Test volumes stay tiny
            let count = self.records.lock().unwrap().len() as i64;
            Ok(count)
        })
    }
}

/// Dead-letter store whose every operation fails.
///
/// Used to verify that a quarantine outage is loud but does not leak an
/// error past the delivery boundary.
#[derive(Clone, Copy, Default)]
pub struct FailingDeadLetterStore;

impl FailingDeadLetterStore {
    /// Create a new failing store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DeadLetterStore for FailingDeadLetterStore {
    fn record(
        &self,
        _entry: NewDeadLetter,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
        Box::pin(async {
            Err(DeadLetterError::Storage(
                "Injected dead letter outage".to_string(),
            ))
        })
    }

    fn list_recent(
        &self,
        _limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DeadLetterRecord>>> + Send + '_>> {
        Box::pin(async {
            Err(DeadLetterError::Storage(
                "Injected dead letter outage".to_string(),
            ))
        })
    }

    fn find_by_event_id(
        &self,
        _event_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DeadLetterRecord>>> + Send + '_>> {
        Box::pin(async {
            Err(DeadLetterError::Storage(
                "Injected dead letter outage".to_string(),
            ))
        })
    }

    fn count(&self) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
        Box::pin(async {
            Err(DeadLetterError::Storage(
                "Injected dead letter outage".to_string(),
            ))
        })
    }
}
