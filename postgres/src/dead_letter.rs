//! `PostgreSQL`-backed dead-letter store.
//!
//! # Overview
//!
//! Events that exhausted their retries (or failed fatally) land here with
//! their full payload, so nothing is lost even when projection gives up.
//! Every escalation writes exactly one row; the same event escalating twice
//! across independent deliveries leaves two rows, which is itself a signal
//! worth seeing during triage.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE dead_letter (
//!     id          BIGSERIAL PRIMARY KEY,
//!     event_id    TEXT NOT NULL,
//!     event_type  TEXT NOT NULL,
//!     payload     JSONB NOT NULL,
//!     reason      TEXT NOT NULL,
//!     recorded_at TIMESTAMPTZ NOT NULL
//! );
//! ```

use paperboard_core::dead_letter::{
    DeadLetterError, DeadLetterRecord, DeadLetterStore, NewDeadLetter, Result,
};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::future::Future;
use std::pin::Pin;

/// PostgreSQL-backed dead-letter store.
///
/// Usually shares a pool with [`PostgresReadModelStore`], but escalation
/// writes run outside the projection transaction: a quarantine record must
/// survive even though the failed attempt rolled back.
///
/// [`PostgresReadModelStore`]: crate::PostgresReadModelStore
#[derive(Clone)]
pub struct PostgresDeadLetterStore {
    pool: PgPool,
}

impl PostgresDeadLetterStore {
    /// Create a store from an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_record(row: &PgRow) -> DeadLetterRecord {
    DeadLetterRecord {
        id: row.get("id"),
        event_id: row.get("event_id"),
        event_type: row.get("event_type"),
        payload: row.get("payload"),
        reason: row.get("reason"),
        recorded_at: row.get("recorded_at"),
    }
}

impl DeadLetterStore for PostgresDeadLetterStore {
    fn record(
        &self,
        entry: NewDeadLetter,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
        Box::pin(async move {
            let id: (i64,) = sqlx::query_as(
                "INSERT INTO dead_letter (event_id, event_type, payload, reason, recorded_at)
                 VALUES ($1, $2, $3, $4, now())
                 RETURNING id",
            )
            .bind(&entry.event_id)
            .bind(&entry.event_type)
            .bind(&entry.payload)
            .bind(&entry.reason)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DeadLetterError::Storage(format!("Failed to record dead letter: {e}")))?;

            tracing::warn!(
                dead_letter_id = id.0,
                event_id = %entry.event_id,
                event_type = %entry.event_type,
                reason = %entry.reason,
                "Event added to dead letter store"
            );

            metrics::counter!(
                "read_model.dlq.recorded",
                "event_type" => entry.event_type.clone()
            )
            .increment(1);

            Ok(id.0)
        })
    }

    fn list_recent(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DeadLetterRecord>>> + Send + '_>> {
        Box::pin(async move {
            // Quarantine volumes are nowhere near i64 territory.
            #[allow(clippy::cast_possible_wrap)]
            let limit = limit as i64;

            let rows = sqlx::query(
                "SELECT id, event_id, event_type, payload, reason, recorded_at
                 FROM dead_letter
                 ORDER BY recorded_at DESC
                 LIMIT $1",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DeadLetterError::Storage(format!("Failed to list dead letters: {e}")))?;

            Ok(rows.iter().map(row_to_record).collect())
        })
    }

    fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DeadLetterRecord>>> + Send + '_>> {
        let event_id = event_id.to_string();
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, event_id, event_type, payload, reason, recorded_at
                 FROM dead_letter
                 WHERE event_id = $1
                 ORDER BY recorded_at ASC",
            )
            .bind(event_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DeadLetterError::Storage(format!("Failed to query dead letters: {e}")))?;

            Ok(rows.iter().map(row_to_record).collect())
        })
    }

    fn count(&self) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
        Box::pin(async move {
            let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM dead_letter")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    DeadLetterError::Storage(format!("Failed to count dead letters: {e}"))
                })?;

            Ok(count.0)
        })
    }
}
