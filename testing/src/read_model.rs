//! In-memory read-model backends for fast, deterministic testing.
//!
//! [`InMemoryReadModelStore`] gives projection tests real transactional
//! semantics without a database: a transaction stages its mutations on a
//! snapshot and swaps it in atomically on commit, so dropping an
//! uncommitted transaction discards the claim exactly like a rolled-back
//! database transaction. [`FlakyReadModelStore`] wraps any store with
//! injectable failures for exercising the retry path.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use chrono::{DateTime, Utc};
use paperboard_core::projection::{
    ClaimOutcome, NewPost, PostReadModel, ProjectionError, ReadModelStore, ReadModelTx, Result,
};
use paperboard_core::types::PostId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone)]
struct LedgerEntry {
    event_type: String,
    processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct Inner {
    posts: HashMap<PostId, PostReadModel>,
    ledger: HashMap<String, LedgerEntry>,
}

/// In-memory read model store for fast, deterministic testing.
///
/// Transactions serialize: [`ReadModelStore::begin`] waits until the
/// previous transaction commits or drops. Keep that in mind when holding a
/// transaction open while calling the store's accessors from the same task,
/// since the accessor would wait on the open transaction.
///
/// # Example
///
/// ```
/// use paperboard_testing::InMemoryReadModelStore;
/// use paperboard_core::projection::{ClaimOutcome, ReadModelStore, ReadModelTx};
/// use chrono::Utc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryReadModelStore::new();
///
/// let mut tx = store.begin().await?;
/// let claim = tx.try_claim("like:1:u1", "PostLiked.v1", Utc::now()).await?;
/// assert_eq!(claim, ClaimOutcome::Claimed);
/// tx.commit().await?;
///
/// assert!(store.is_claimed("like:1:u1").await);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryReadModelStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryReadModelStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a post row outside any transaction.
    pub async fn post(&self, post_id: PostId) -> Option<PostReadModel> {
        self.inner.lock().await.posts.get(&post_id).cloned()
    }

    /// Number of post rows currently in the read model.
    pub async fn post_count(&self) -> usize {
        self.inner.lock().await.posts.len()
    }

    /// Whether an idempotency key has been claimed (and committed).
    pub async fn is_claimed(&self, key: &str) -> bool {
        self.inner.lock().await.ledger.contains_key(key)
    }

    /// The event type recorded for a claimed key, if any.
    pub async fn claimed_event_type(&self, key: &str) -> Option<String> {
        self.inner
            .lock()
            .await
            .ledger
            .get(key)
            .map(|entry| entry.event_type.clone())
    }

    /// Number of committed ledger entries.
    pub async fn ledger_len(&self) -> usize {
        self.inner.lock().await.ledger.len()
    }

    /// Clear all rows and ledger entries (for test isolation).
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.posts.clear();
        inner.ledger.clear();
    }
}

/// One open transaction: a staged snapshot plus the lock that makes the
/// commit swap atomic.
#[derive(Debug)]
pub struct InMemoryReadModelTx {
    guard: OwnedMutexGuard<Inner>,
    staged: Inner,
}

impl InMemoryReadModelTx {
    fn post_mut(&mut self, post_id: PostId) -> Result<&mut PostReadModel> {
        self.staged.posts.get_mut(&post_id).ok_or_else(|| {
            ProjectionError::Transient(format!("Post {post_id} has no read-model row yet"))
        })
    }
}

impl ReadModelTx for InMemoryReadModelTx {
    async fn try_claim(
        &mut self,
        key: &str,
        event_type: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        if self.staged.ledger.contains_key(key) {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        self.staged.ledger.insert(
            key.to_string(),
            LedgerEntry {
                event_type: event_type.to_string(),
                processed_at,
            },
        );
        Ok(ClaimOutcome::Claimed)
    }

    async fn insert_post(&mut self, post: &NewPost) -> Result<()> {
        self.staged
            .posts
            .entry(post.post_id)
            .or_insert_with(|| PostReadModel::from(post));
        Ok(())
    }

    async fn update_title(&mut self, post_id: PostId, new_title: &str) -> Result<()> {
        self.post_mut(post_id)?.title = new_title.to_string();
        Ok(())
    }

    async fn increment_like_count(&mut self, post_id: PostId) -> Result<()> {
        self.post_mut(post_id)?.like_count += 1;
        Ok(())
    }

    async fn decrement_like_count(&mut self, post_id: PostId) -> Result<()> {
        let row = self.post_mut(post_id)?;
        row.like_count = (row.like_count - 1).max(0);
        Ok(())
    }

    async fn increment_comment_count(&mut self, post_id: PostId) -> Result<()> {
        self.post_mut(post_id)?.comment_count += 1;
        Ok(())
    }

    async fn decrement_comment_count(&mut self, post_id: PostId) -> Result<()> {
        let row = self.post_mut(post_id)?;
        row.comment_count = (row.comment_count - 1).max(0);
        Ok(())
    }

    async fn delete_post(&mut self, post_id: PostId) -> Result<()> {
        self.staged.posts.remove(&post_id);
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let Self { mut guard, staged } = self;
        *guard = staged;
        Ok(())
    }
}

impl ReadModelStore for InMemoryReadModelStore {
    type Tx = InMemoryReadModelTx;

    async fn begin(&self) -> Result<Self::Tx> {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        let staged = guard.clone();
        Ok(InMemoryReadModelTx { guard, staged })
    }

    async fn get_post(&self, post_id: PostId) -> Result<Option<PostReadModel>> {
        Ok(self.post(post_id).await)
    }

    async fn record_view(&self, post_id: PostId) -> Result<()> {
        if let Some(row) = self.inner.lock().await.posts.get_mut(&post_id) {
            row.view_count += 1;
        }
        Ok(())
    }

    async fn prune_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.ledger.len();
        inner.ledger.retain(|_, entry| entry.processed_at >= cutoff);
        Ok((before - inner.ledger.len()) as u64)
    }
}

/// Wrapper that fails [`ReadModelStore::begin`] a configured number of
/// times before delegating to the wrapped store.
///
/// Failing at `begin` keeps each failed attempt all-or-nothing: no claim
/// and no mutation ever happened, exactly like a connection that died
/// before the transaction opened.
///
/// # Example
///
/// ```
/// use paperboard_testing::{FlakyReadModelStore, InMemoryReadModelStore};
/// use paperboard_core::projection::ReadModelStore;
///
/// # async fn example() {
/// let store = FlakyReadModelStore::failing_transiently(InMemoryReadModelStore::new(), 2);
/// assert!(store.begin().await.is_err());
/// assert!(store.begin().await.is_err());
/// assert!(store.begin().await.is_ok());
/// assert_eq!(store.begin_calls(), 3);
/// # }
/// ```
#[derive(Clone)]
pub struct FlakyReadModelStore<S> {
    inner: S,
    state: Arc<FlakyState>,
}

struct FlakyState {
    remaining_failures: AtomicUsize,
    fail_fatally: bool,
    begin_calls: AtomicUsize,
}

impl<S> FlakyReadModelStore<S> {
    /// Fail the next `failures` calls to `begin` with a transient error.
    #[must_use]
    pub fn failing_transiently(inner: S, failures: usize) -> Self {
        Self::with_mode(inner, failures, false)
    }

    /// Fail the next `failures` calls to `begin` with a fatal error.
    #[must_use]
    pub fn failing_fatally(inner: S, failures: usize) -> Self {
        Self::with_mode(inner, failures, true)
    }

    fn with_mode(inner: S, failures: usize, fail_fatally: bool) -> Self {
        Self {
            inner,
            state: Arc::new(FlakyState {
                remaining_failures: AtomicUsize::new(failures),
                fail_fatally,
                begin_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// How many times `begin` has been called, failures included.
    #[must_use]
    pub fn begin_calls(&self) -> usize {
        self.state.begin_calls.load(Ordering::SeqCst)
    }

    /// Access the wrapped store for assertions.
    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: ReadModelStore> ReadModelStore for FlakyReadModelStore<S> {
    type Tx = S::Tx;

    async fn begin(&self) -> Result<Self::Tx> {
        self.state.begin_calls.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .state
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if injected {
            return Err(if self.state.fail_fatally {
                ProjectionError::Fatal("Injected storage failure".to_string())
            } else {
                ProjectionError::Transient("Injected storage failure".to_string())
            });
        }

        self.inner.begin().await
    }

    async fn get_post(&self, post_id: PostId) -> Result<Option<PostReadModel>> {
        self.inner.get_post(post_id).await
    }

    async fn record_view(&self, post_id: PostId) -> Result<()> {
        self.inner.record_view(post_id).await
    }

    async fn prune_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.inner.prune_processed_before(cutoff).await
    }
}
