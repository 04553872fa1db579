//! Applies post events to the read model, exactly once per idempotency key.
//!
//! The projector is the only component that opens read-model transactions.
//! Every delivery follows the same shape:
//!
//! 1. Begin a transaction.
//! 2. Claim the delivery's idempotency key in the processed-event ledger.
//! 3. If the key was already claimed, drop the transaction and skip.
//! 4. Otherwise apply the event's mutation and commit claim + mutation
//!    together.
//!
//! Because the claim and the mutation commit atomically, a crash between
//! claim and commit releases the claim, and the next redelivery applies the
//! event cleanly. Two racing deliveries of the same event cannot both apply:
//! the ledger's primary key arbitrates, and the loser sees
//! [`ClaimOutcome::AlreadyClaimed`].

use paperboard_core::environment::{Clock, SystemClock};
use paperboard_core::event::{Event, PostEvent, PostEventEnvelope};
use paperboard_core::projection::{
    ClaimOutcome, NewPost, ProjectionError, ProjectionOutcome, ReadModelStore, ReadModelTx, Result,
};
use std::sync::Arc;

/// Projects [`PostEvent`]s into the post read model.
///
/// Generic over the store so the same projection logic runs against Postgres
/// in production and the in-memory store in tests.
pub struct PostProjector<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: ReadModelStore> PostProjector<S> {
    /// Create a projector that stamps ledger entries with the system clock.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Create a projector with an explicit clock, for deterministic tests.
    #[must_use]
    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The underlying read-model store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Apply a single event delivery to the read model.
    ///
    /// Returns [`ProjectionOutcome::Applied`] when this delivery won the
    /// claim and its mutation committed, or [`ProjectionOutcome::Skipped`]
    /// when the idempotency key was claimed by an earlier delivery.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Fatal`] for events with an empty
    /// idempotency key, and propagates store errors with their transient or
    /// fatal classification intact. On any error the transaction is dropped
    /// and the claim is released, so a retry starts from scratch.
    #[tracing::instrument(skip(self, envelope), name = "project_event")]
    pub async fn project(&self, envelope: &PostEventEnvelope) -> Result<ProjectionOutcome> {
        let key = envelope.idempotency_key();
        if key.is_empty() {
            return Err(ProjectionError::Fatal(format!(
                "Event {} ({}) has an empty idempotency key",
                envelope.event_id,
                envelope.event_type()
            )));
        }

        let mut tx = self.store.begin().await?;

        match tx
            .try_claim(&key, envelope.event_type(), self.clock.now())
            .await?
        {
            ClaimOutcome::AlreadyClaimed => {
                // Dropping the transaction discards the claim attempt.
                tracing::debug!(
                    event_id = %envelope.event_id,
                    idempotency_key = %key,
                    "Event already applied, skipping"
                );
                metrics::counter!(
                    "read_model.projection.skipped",
                    "event_type" => envelope.event_type()
                )
                .increment(1);
                return Ok(ProjectionOutcome::Skipped);
            }
            ClaimOutcome::Claimed => {}
        }

        apply(&mut tx, &envelope.event).await?;
        tx.commit().await?;

        tracing::debug!(
            event_id = %envelope.event_id,
            event_type = envelope.event_type(),
            idempotency_key = %key,
            "Event applied to read model"
        );
        metrics::counter!(
            "read_model.projection.applied",
            "event_type" => envelope.event_type()
        )
        .increment(1);

        Ok(ProjectionOutcome::Applied)
    }
}

/// Dispatch an event to the matching read-model mutation.
async fn apply<T: ReadModelTx>(tx: &mut T, event: &PostEvent) -> Result<()> {
    match event {
        PostEvent::PostCreated {
            post_id,
            title,
            author_id,
            author_name,
            created_at,
            ..
        } => {
            let post = NewPost {
                post_id: *post_id,
                title: title.clone(),
                author_id: *author_id,
                author_name: author_name.clone(),
                created_at: *created_at,
            };
            tx.insert_post(&post).await
        }
        PostEvent::PostUpdated {
            post_id, new_title, ..
        } => tx.update_title(*post_id, new_title).await,
        PostEvent::PostLiked { post_id, .. } => tx.increment_like_count(*post_id).await,
        PostEvent::PostUnliked { post_id } => tx.decrement_like_count(*post_id).await,
        PostEvent::CommentCreated { post_id, .. } => tx.increment_comment_count(*post_id).await,
        PostEvent::CommentDeleted { post_id } => tx.decrement_comment_count(*post_id).await,
        PostEvent::PostDeleted { post_id, .. } => tx.delete_post(*post_id).await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use paperboard_core::types::{AuthorId, PostId};
    use paperboard_core::{DateTime, Utc};
    use paperboard_testing::read_model::InMemoryReadModelStore;
    use paperboard_testing::test_clock;

    fn created(post_id: i64, key: &str) -> PostEventEnvelope {
        PostEventEnvelope::new(PostEvent::PostCreated {
            post_id: PostId::new(post_id),
            title: "Hello".to_string(),
            author_id: AuthorId::new(7),
            author_name: "mina".to_string(),
            created_at: Utc::now(),
            idempotency_key: key.to_string(),
        })
    }

    fn liked(post_id: i64, key: &str) -> PostEventEnvelope {
        PostEventEnvelope::new(PostEvent::PostLiked {
            post_id: PostId::new(post_id),
            idempotency_key: key.to_string(),
        })
    }

    fn projector(store: &InMemoryReadModelStore) -> PostProjector<InMemoryReadModelStore> {
        PostProjector::with_clock(store.clone(), Arc::new(test_clock()))
    }

    #[tokio::test]
    async fn first_delivery_applies_and_claims() {
        let store = InMemoryReadModelStore::new();
        let projector = projector(&store);

        let outcome = projector
            .project(&created(1, "post-create:1"))
            .await
            .unwrap();

        assert_eq!(outcome, ProjectionOutcome::Applied);
        assert!(store.is_claimed("post-create:1").await);
        let post = store.post(PostId::new(1)).await.unwrap();
        assert_eq!(post.title, "Hello");
        assert_eq!(post.like_count, 0);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_skipped() {
        let store = InMemoryReadModelStore::new();
        let projector = projector(&store);

        projector.project(&created(1, "post-create:1")).await.unwrap();
        let like = liked(1, "post-like:1:member-2");

        assert_eq!(
            projector.project(&like).await.unwrap(),
            ProjectionOutcome::Applied
        );
        assert_eq!(
            projector.project(&like).await.unwrap(),
            ProjectionOutcome::Skipped
        );

        let post = store.post(PostId::new(1)).await.unwrap();
        assert_eq!(post.like_count, 1, "duplicate like must not double-count");
    }

    #[tokio::test]
    async fn empty_idempotency_key_is_fatal() {
        let store = InMemoryReadModelStore::new();
        let projector = projector(&store);

        let error = projector.project(&liked(1, "")).await.unwrap_err();

        assert!(!error.is_transient());
        assert_eq!(store.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn failed_mutation_releases_the_claim() {
        let store = InMemoryReadModelStore::new();
        let projector = projector(&store);

        // No read-model row for post 9, so the counter mutation fails and
        // the transaction (claim included) is dropped.
        let error = projector
            .project(&liked(9, "post-like:9:member-1"))
            .await
            .unwrap_err();

        assert!(error.is_transient());
        assert!(!store.is_claimed("post-like:9:member-1").await);
    }

    #[tokio::test]
    async fn ledger_entries_use_the_injected_clock() {
        let store = InMemoryReadModelStore::new();
        let clock = Arc::new(test_clock());
        let expected: DateTime<Utc> = clock.now();
        let projector = PostProjector::with_clock(store.clone(), clock);

        projector.project(&created(1, "post-create:1")).await.unwrap();

        assert!(store.is_claimed("post-create:1").await);
        // The fixed clock pins processed_at; pruning strictly after that
        // instant must remove the entry.
        let pruned = store
            .prune_processed_before(expected + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(pruned, 1);
    }
}
