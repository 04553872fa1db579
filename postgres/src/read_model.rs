//! `PostgreSQL`-backed post read model.
//!
//! # Architecture
//!
//! - **Storage**: one denormalized `post_read_model` row per post
//! - **Idempotency**: `processed_event` ledger, claimed inside the same
//!   transaction as the mutation
//! - **Counters**: in-place atomic deltas (`like_count = like_count + 1`),
//!   decrements clamped at zero with `GREATEST`
//! - **CQRS**: designed to live in a separate database from the write side
//!
//! The claim is a plain insert racing on the ledger's primary key. Whichever
//! transaction commits first wins the key; the loser sees zero rows affected
//! and reports the delivery as a duplicate. There is deliberately no
//! exists-check before the insert, since check-then-insert opens a window
//! where two workers both conclude the key is free.

use chrono::{DateTime, Utc};
use paperboard_core::projection::{
    ClaimOutcome, NewPost, PostReadModel, ProjectionError, ReadModelStore, ReadModelTx, Result,
};
use paperboard_core::types::{AuthorId, PostId};
use sqlx::postgres::{PgPool, PgPoolOptions, PgQueryResult};
use sqlx::{Postgres, Transaction};

/// Map a sqlx error onto the retry taxonomy.
///
/// Connection-level failures are worth retrying; anything else (constraint
/// violations, decode failures, SQL logic errors) will fail the same way on
/// every attempt and should escalate without burning the retry budget.
fn classify(context: &str, error: sqlx::Error) -> ProjectionError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => ProjectionError::Transient(format!("{context}: {error}")),
        other => ProjectionError::Fatal(format!("{context}: {other}")),
    }
}

/// Mutations that target an existing row report a missing target as
/// transient: under unordered delivery the creating event may simply not
/// have landed yet, and the retry delay doubles as a reordering window.
fn require_row(result: &PgQueryResult, post_id: PostId) -> Result<()> {
    if result.rows_affected() == 0 {
        return Err(ProjectionError::Transient(format!(
            "Post {post_id} has no read-model row yet"
        )));
    }
    Ok(())
}

/// PostgreSQL-backed read model store.
///
/// # Example
///
/// ```ignore
/// use paperboard_postgres::PostgresReadModelStore;
///
/// let store = PostgresReadModelStore::new("postgres://localhost/paperboard_read").await?;
/// store.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresReadModelStore {
    pool: PgPool,
}

impl PostgresReadModelStore {
    /// Connect to the read-model database.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Transient`] if the connection fails.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10) // Reasonable default; workers share this pool
            .connect(database_url)
            .await
            .map_err(|e| ProjectionError::Transient(format!("Failed to connect: {e}")))?;

        Ok(Self::from_pool(pool))
    }

    /// Create a store from an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying connection pool.
    ///
    /// Useful for health checks or manual queries.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations for the read-model tables.
    ///
    /// Creates `post_read_model`, `processed_event` and `dead_letter` if
    /// they don't already exist.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Fatal`] if migration fails; a half-applied
    /// schema is not something a retry will fix.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ProjectionError::Fatal(format!("Migration failed: {e}")))?;
        Ok(())
    }
}

/// One open transaction over the read model and the ledger.
///
/// Created by [`PostgresReadModelStore::begin`]. Dropping it without
/// committing rolls back the claim together with any staged mutations.
pub struct PostgresReadModelTx {
    tx: Transaction<'static, Postgres>,
}

impl ReadModelTx for PostgresReadModelTx {
    async fn try_claim(
        &mut self,
        key: &str,
        event_type: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        let result = sqlx::query(
            "INSERT INTO processed_event (event_id, event_type, processed_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(key)
        .bind(event_type)
        .bind(processed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("Failed to claim event", e))?;

        if result.rows_affected() == 0 {
            Ok(ClaimOutcome::AlreadyClaimed)
        } else {
            Ok(ClaimOutcome::Claimed)
        }
    }

    async fn insert_post(&mut self, post: &NewPost) -> Result<()> {
        sqlx::query(
            "INSERT INTO post_read_model
             (post_id, title, view_count, like_count, comment_count, author_id, author_name, created_at)
             VALUES ($1, $2, 0, 0, 0, $3, $4, $5)
             ON CONFLICT (post_id) DO NOTHING",
        )
        .bind(post.post_id.as_i64())
        .bind(&post.title)
        .bind(post.author_id.as_i64())
        .bind(&post.author_name)
        .bind(post.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("Failed to insert post", e))?;

        Ok(())
    }

    async fn update_title(&mut self, post_id: PostId, new_title: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE post_read_model
             SET title = $2
             WHERE post_id = $1",
        )
        .bind(post_id.as_i64())
        .bind(new_title)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("Failed to update title", e))?;

        require_row(&result, post_id)
    }

    async fn increment_like_count(&mut self, post_id: PostId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE post_read_model
             SET like_count = like_count + 1
             WHERE post_id = $1",
        )
        .bind(post_id.as_i64())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("Failed to increment like count", e))?;

        require_row(&result, post_id)
    }

    async fn decrement_like_count(&mut self, post_id: PostId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE post_read_model
             SET like_count = GREATEST(0, like_count - 1)
             WHERE post_id = $1",
        )
        .bind(post_id.as_i64())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("Failed to decrement like count", e))?;

        require_row(&result, post_id)
    }

    async fn increment_comment_count(&mut self, post_id: PostId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE post_read_model
             SET comment_count = comment_count + 1
             WHERE post_id = $1",
        )
        .bind(post_id.as_i64())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("Failed to increment comment count", e))?;

        require_row(&result, post_id)
    }

    async fn decrement_comment_count(&mut self, post_id: PostId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE post_read_model
             SET comment_count = GREATEST(0, comment_count - 1)
             WHERE post_id = $1",
        )
        .bind(post_id.as_i64())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify("Failed to decrement comment count", e))?;

        require_row(&result, post_id)
    }

    async fn delete_post(&mut self, post_id: PostId) -> Result<()> {
        // Deletion is naturally idempotent; zero rows affected is success.
        sqlx::query("DELETE FROM post_read_model WHERE post_id = $1")
            .bind(post_id.as_i64())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| classify("Failed to delete post", e))?;

        Ok(())
    }

    async fn commit(self) -> Result<()> {
        // An ambiguous commit (acknowledgement lost) is safe to retry: the
        // redelivery either finds the key claimed and skips, or claims it
        // fresh if the commit never landed.
        self.tx
            .commit()
            .await
            .map_err(|e| ProjectionError::Transient(format!("Failed to commit: {e}")))
    }
}

impl ReadModelStore for PostgresReadModelStore {
    type Tx = PostgresReadModelTx;

    async fn begin(&self) -> Result<Self::Tx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ProjectionError::Transient(format!("Failed to begin transaction: {e}")))?;

        Ok(PostgresReadModelTx { tx })
    }

    async fn get_post(&self, post_id: PostId) -> Result<Option<PostReadModel>> {
        let row: Option<(i64, String, i64, i64, i64, i64, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT post_id, title, view_count, like_count, comment_count,
                    author_id, author_name, created_at
             FROM post_read_model
             WHERE post_id = $1",
        )
        .bind(post_id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify("Failed to query post", e))?;

        Ok(row.map(
            |(post_id, title, view_count, like_count, comment_count, author_id, author_name, created_at)| {
                PostReadModel {
                    post_id: PostId::new(post_id),
                    title,
                    view_count,
                    like_count,
                    comment_count,
                    author_id: AuthorId::new(author_id),
                    author_name,
                    created_at,
                }
            },
        ))
    }

    async fn record_view(&self, post_id: PostId) -> Result<()> {
        // No ledger involvement: view bumps need no idempotency, and a
        // missing row just means there is nothing to count yet.
        sqlx::query(
            "UPDATE post_read_model
             SET view_count = view_count + 1
             WHERE post_id = $1",
        )
        .bind(post_id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(|e| classify("Failed to record view", e))?;

        Ok(())
    }

    async fn prune_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM processed_event WHERE processed_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| classify("Failed to prune ledger", e))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Structure-level tests only; tests against a real Postgres are in
    // tests/integration_tests.rs.

    #[test]
    fn pool_timeouts_are_transient() {
        let error = classify("claim", sqlx::Error::PoolTimedOut);
        assert!(error.is_transient());
    }

    #[test]
    fn io_errors_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let error = classify("claim", sqlx::Error::Io(io));
        assert!(error.is_transient());
    }

    #[test]
    fn unexpected_errors_are_fatal() {
        let error = classify("query", sqlx::Error::RowNotFound);
        assert!(!error.is_transient());
    }
}
