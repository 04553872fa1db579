//! Contracts for keeping the post read model in sync with write-side events.
//!
//! # Overview
//!
//! This is the **query side of CQRS**: write-side mutations arrive as events
//! and are folded into a denormalized `post_read_model` row optimized for
//! feed queries. Delivery is at-least-once and unordered, so correctness
//! rests on two disciplines:
//!
//! - **Claim before apply**: every event's idempotency key is claimed in the
//!   processed-event ledger inside the same transaction that mutates the
//!   read model. A duplicate delivery finds the key claimed and skips.
//! - **Atomic counter deltas**: like/comment/view counters move only by
//!   atomic ±1 operations against the store, never read-modify-write, so
//!   concurrent workers interleave safely.
//!
//! ```text
//! Write Side:                   Read Side:
//! ┌─────────────────┐          ┌──────────────────────┐
//! │  post CRUD      │          │  post_read_model     │
//! │                 │  events  │  processed_event     │
//! │  (out of scope) │ ───────► │  (one tx per event)  │
//! └─────────────────┘          └──────────────────────┘
//! ```
//!
//! # Transaction shape
//!
//! [`ReadModelStore::begin`] opens a [`ReadModelTx`]. The projector claims
//! the key, applies the event-specific mutation through the transaction's
//! primitives, then commits. Dropping the transaction without committing
//! discards the claim together with any staged mutations, so a failed
//! attempt leaves nothing behind and the retry can claim again.

use crate::types::{AuthorId, PostId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Error type for projection operations.
///
/// The two variants drive the retry controller: transient failures are
/// expected to self-resolve and consume retry budget; fatal failures
/// escalate to the dead-letter store immediately.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// Infrastructure failure expected to self-resolve (timeout, connection
    /// loss, pool exhaustion, a target row that does not exist yet).
    #[error("Transient infrastructure error: {0}")]
    Transient(String),

    /// Non-retryable failure (malformed payload, logic error). Retrying
    /// would burn budget on an attempt that can never succeed.
    #[error("Fatal projection error: {0}")]
    Fatal(String),
}

impl ProjectionError {
    /// Whether the retry controller should spend budget on this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Outcome of claiming an idempotency key in the processed-event ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The key was newly claimed; the caller owns the one logical
    /// application of this event.
    Claimed,

    /// The key was already claimed by an earlier delivery.
    AlreadyClaimed,
}

/// Outcome of projecting a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOutcome {
    /// The event's mutation was applied and the key recorded.
    Applied,

    /// A duplicate delivery; the read model was not touched.
    Skipped,
}

/// What the handler reports back to the dispatcher for one delivery.
///
/// This is the whole story the transport ever sees: every delivery ends
/// handled. Failures that exhaust the retry budget surface as `Escalated`
/// after the event is quarantined in the dead-letter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Projection applied the mutation.
    Applied,

    /// Duplicate delivery, skipped by the ledger.
    Skipped,

    /// Retries exhausted or fatal error; the event went to the dead-letter
    /// store.
    Escalated,
}

impl DeliveryOutcome {
    /// String form for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Skipped => "skipped",
            Self::Escalated => "escalated",
        }
    }
}

impl From<ProjectionOutcome> for DeliveryOutcome {
    fn from(outcome: ProjectionOutcome) -> Self {
        match outcome {
            ProjectionOutcome::Applied => Self::Applied,
            ProjectionOutcome::Skipped => Self::Skipped,
        }
    }
}

/// A denormalized post row, shaped for feed and detail queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReadModel {
    /// Write-side post key.
    pub post_id: PostId,

    /// Current title.
    pub title: String,

    /// Number of views, bumped by the query layer.
    pub view_count: i64,

    /// Number of likes.
    pub like_count: i64,

    /// Number of comments.
    pub comment_count: i64,

    /// Author snapshot: id.
    pub author_id: AuthorId,

    /// Author snapshot: display name at creation time.
    pub author_name: String,

    /// Creation timestamp from the write side.
    pub created_at: DateTime<Utc>,
}

/// Fields needed to seed a read-model row for a newly created post.
///
/// Counters are implicit: a new row always starts at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    /// Write-side post key.
    pub post_id: PostId,

    /// Title at creation time.
    pub title: String,

    /// Author snapshot: id.
    pub author_id: AuthorId,

    /// Author snapshot: display name.
    pub author_name: String,

    /// Creation timestamp from the write side.
    pub created_at: DateTime<Utc>,
}

impl From<&NewPost> for PostReadModel {
    fn from(post: &NewPost) -> Self {
        Self {
            post_id: post.post_id,
            title: post.title.clone(),
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            author_id: post.author_id,
            author_name: post.author_name.clone(),
            created_at: post.created_at,
        }
    }
}

/// One transaction over the read model and its processed-event ledger.
///
/// All methods stage work inside the same transaction; nothing is visible
/// until [`ReadModelTx::commit`]. Dropping the value without committing
/// rolls everything back, claim included.
///
/// # Error contract
///
/// Counter and title mutations targeting a post that has no row yet return
/// [`ProjectionError::Transient`]: under unordered delivery the creating
/// event may still be in flight, and the retry budget doubles as a short
/// reordering window. [`ReadModelTx::delete_post`] on a missing row is a
/// successful no-op, since deletion is naturally idempotent.
pub trait ReadModelTx: Send {
    /// Atomically claim an idempotency key in the processed-event ledger.
    ///
    /// Implemented as a single insert guarded by the key's uniqueness
    /// constraint, never as an exists-check followed by an insert, so two
    /// workers racing on the same key cannot both claim it.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Transient`] on store failure.
    fn try_claim(
        &mut self,
        key: &str,
        event_type: &str,
        processed_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<ClaimOutcome>> + Send;

    /// Seed a fresh row with zeroed counters.
    ///
    /// Inserting a post that already has a row is a no-op (the row was
    /// seeded by an earlier create that lost its ledger key; the duplicate
    /// carries nothing new).
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Transient`] on store failure.
    fn insert_post(&mut self, post: &NewPost) -> impl Future<Output = Result<()>> + Send;

    /// Overwrite the title.
    ///
    /// # Errors
    ///
    /// See the trait-level error contract.
    fn update_title(
        &mut self,
        post_id: PostId,
        new_title: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Atomic `like_count += 1`.
    ///
    /// # Errors
    ///
    /// See the trait-level error contract.
    fn increment_like_count(&mut self, post_id: PostId)
    -> impl Future<Output = Result<()>> + Send;

    /// Atomic `like_count -= 1`, clamped at zero.
    ///
    /// # Errors
    ///
    /// See the trait-level error contract.
    fn decrement_like_count(&mut self, post_id: PostId)
    -> impl Future<Output = Result<()>> + Send;

    /// Atomic `comment_count += 1`.
    ///
    /// # Errors
    ///
    /// See the trait-level error contract.
    fn increment_comment_count(
        &mut self,
        post_id: PostId,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Atomic `comment_count -= 1`, clamped at zero.
    ///
    /// # Errors
    ///
    /// See the trait-level error contract.
    fn decrement_comment_count(
        &mut self,
        post_id: PostId,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove the row for a hard-deleted post. Missing row is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Transient`] on store failure.
    fn delete_post(&mut self, post_id: PostId) -> impl Future<Output = Result<()>> + Send;

    /// Commit the claim and all staged mutations atomically.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Transient`] if the commit fails; nothing
    /// is applied in that case and the delivery can be retried.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;
}

/// Storage backend for the post read model plus its processed-event ledger.
///
/// The projector drives this through [`ReadModelStore::begin`]; the
/// remaining methods are the query surface for the (out-of-scope) read
/// layer and operations.
pub trait ReadModelStore: Send + Sync {
    /// The transaction type this store hands out.
    type Tx: ReadModelTx;

    /// Open a transaction covering the read model and the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Transient`] if a transaction cannot be
    /// started (pool exhausted, connection lost).
    fn begin(&self) -> impl Future<Output = Result<Self::Tx>> + Send;

    /// Fetch a post row, if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Transient`] on store failure.
    fn get_post(
        &self,
        post_id: PostId,
    ) -> impl Future<Output = Result<Option<PostReadModel>>> + Send;

    /// Atomic `view_count += 1`, called by the query layer on each fetch.
    ///
    /// Views are deliberately outside the event pipeline: they need no
    /// idempotency and a lost bump is acceptable. A missing row is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Transient`] on store failure.
    fn record_view(&self, post_id: PostId) -> impl Future<Output = Result<()>> + Send;

    /// Retention hook: delete ledger entries processed before `cutoff`.
    ///
    /// Core behavior never calls this; deployments schedule it to bound
    /// ledger growth. Returns the number of entries removed. Pruning a key
    /// re-opens the duplicate window for deliveries older than the cutoff,
    /// so the cutoff must exceed the transport's maximum redelivery horizon.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Transient`] on store failure.
    fn prune_processed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_row_starts_with_zero_counters() {
        let new_post = NewPost {
            post_id: PostId::new(7),
            title: "first post".to_string(),
            author_id: AuthorId::new(3),
            author_name: "mina".to_string(),
            created_at: Utc::now(),
        };

        let row = PostReadModel::from(&new_post);
        assert_eq!(row.post_id, PostId::new(7));
        assert_eq!(row.view_count, 0);
        assert_eq!(row.like_count, 0);
        assert_eq!(row.comment_count, 0);
        assert_eq!(row.title, "first post");
    }

    #[test]
    fn delivery_outcome_labels() {
        assert_eq!(DeliveryOutcome::Applied.as_str(), "applied");
        assert_eq!(DeliveryOutcome::Skipped.as_str(), "skipped");
        assert_eq!(DeliveryOutcome::Escalated.as_str(), "escalated");
    }

    #[test]
    fn projection_outcome_converts_to_delivery_outcome() {
        assert_eq!(
            DeliveryOutcome::from(ProjectionOutcome::Applied),
            DeliveryOutcome::Applied
        );
        assert_eq!(
            DeliveryOutcome::from(ProjectionOutcome::Skipped),
            DeliveryOutcome::Skipped
        );
    }

    #[test]
    fn transient_classification() {
        assert!(ProjectionError::Transient("timeout".to_string()).is_transient());
        assert!(!ProjectionError::Fatal("bad payload".to_string()).is_transient());
    }
}
