//! End-to-end worker pool tests: bus in, read model out.
//!
//! These drive the full pipeline (bus, pool, handler, projector, store)
//! over the in-memory backends. Publishing waits for the pool's
//! subscription to attach, and assertions poll the store before the final
//! shutdown-and-drain, so the tests stay deterministic despite the pool's
//! unordered concurrency.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code uses unwrap/expect for clear failure messages

use paperboard_core::Utc;
use paperboard_core::event::{PostEvent, PostEventEnvelope, SerializedEvent};
use paperboard_core::event_bus::EventBus;
use paperboard_core::types::{AuthorId, PostId};
use paperboard_projections::handler::ProjectionEventHandler;
use paperboard_projections::pool::ProjectionWorkerPool;
use paperboard_projections::projector::PostProjector;
use paperboard_projections::retry::RetryPolicy;
use paperboard_testing::dead_letter::InMemoryDeadLetterStore;
use paperboard_testing::event_bus::InMemoryEventBus;
use paperboard_testing::read_model::InMemoryReadModelStore;
use paperboard_testing::test_clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const TOPIC: &str = "post-events";

struct Pipeline {
    store: InMemoryReadModelStore,
    dead_letters: InMemoryDeadLetterStore,
    bus: InMemoryEventBus,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<paperboard_core::projection::Result<()>>,
}

impl Pipeline {
    /// Spawn the full pipeline and wait until its subscription is attached.
    async fn spawn(max_in_flight: usize) -> Self {
        let store = InMemoryReadModelStore::new();
        let dead_letters = InMemoryDeadLetterStore::new();
        let bus = InMemoryEventBus::new();

        let projector = PostProjector::with_clock(store.clone(), Arc::new(test_clock()));
        let handler = Arc::new(ProjectionEventHandler::with_policy(
            projector,
            Arc::new(dead_letters.clone()),
            RetryPolicy::builder()
                .max_attempts(3)
                .base_delay(Duration::from_millis(5))
                .build(),
        ));

        let (pool, shutdown) = ProjectionWorkerPool::new(Arc::new(bus.clone()), handler, TOPIC);
        let mut pool = pool.with_max_in_flight(max_in_flight);
        let task = tokio::spawn(async move { pool.start().await });

        for _ in 0..200 {
            if bus.subscriber_count(TOPIC) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(
            bus.subscriber_count(TOPIC) > 0,
            "worker pool never subscribed to {TOPIC}"
        );

        Self {
            store,
            dead_letters,
            bus,
            shutdown,
            task,
        }
    }

    async fn publish(&self, envelope: &PostEventEnvelope) {
        self.bus
            .publish(TOPIC, &envelope.to_serialized().expect("envelope should serialize"))
            .await
            .expect("publish should succeed");
    }

    /// Publish a create and wait for its row, so later mutations do not
    /// race the insert.
    async fn publish_created_and_wait(&self, post_id: i64) {
        self.publish(&created(post_id)).await;
        for _ in 0..500 {
            if self.store.post(PostId::new(post_id)).await.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("post {post_id} never appeared in the read model");
    }

    /// Signal shutdown and wait for the drained pool to return.
    async fn stop(self) -> (InMemoryReadModelStore, InMemoryDeadLetterStore) {
        self.shutdown.send(true).expect("pool should still be running");
        self.task
            .await
            .expect("pool task should not panic")
            .expect("pool should stop cleanly");
        (self.store, self.dead_letters)
    }
}

fn created(post_id: i64) -> PostEventEnvelope {
    PostEventEnvelope::new(PostEvent::PostCreated {
        post_id: PostId::new(post_id),
        title: format!("Post {post_id}"),
        author_id: AuthorId::new(1),
        author_name: "mina".to_string(),
        created_at: Utc::now(),
        idempotency_key: format!("post-create:{post_id}"),
    })
}

fn liked(post_id: i64, member: usize) -> PostEventEnvelope {
    PostEventEnvelope::new(PostEvent::PostLiked {
        post_id: PostId::new(post_id),
        idempotency_key: format!("post-like:{post_id}:member-{member}"),
    })
}

#[tokio::test]
async fn test_hundred_concurrent_likes_each_count_once() {
    let pipeline = Pipeline::spawn(16).await;
    pipeline.publish_created_and_wait(1).await;

    for member in 0..100 {
        pipeline.publish(&liked(1, member)).await;
    }

    for _ in 0..1000 {
        if pipeline
            .store
            .post(PostId::new(1))
            .await
            .is_some_and(|post| post.like_count == 100)
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (store, dead_letters) = pipeline.stop().await;
    let post = store.post(PostId::new(1)).await.expect("post should exist");
    assert_eq!(post.like_count, 100, "every unique like counts exactly once");
    assert!(dead_letters.is_empty(), "no delivery should have escalated");
}

#[tokio::test]
async fn test_redelivered_event_applies_once_through_the_pool() {
    let pipeline = Pipeline::spawn(8).await;
    pipeline.publish_created_and_wait(1).await;

    let like = liked(1, 1);
    let serialized = like.to_serialized().expect("envelope should serialize");
    for _ in 0..5 {
        pipeline
            .bus
            .publish(TOPIC, &serialized)
            .await
            .expect("publish should succeed");
    }

    for _ in 0..500 {
        if pipeline.store.is_claimed(&like.idempotency_key()).await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (store, dead_letters) = pipeline.stop().await;
    let post = store.post(PostId::new(1)).await.expect("post should exist");
    assert_eq!(post.like_count, 1, "five deliveries, one application");
    assert!(dead_letters.is_empty());
}

#[tokio::test]
async fn test_poison_delivery_does_not_stall_the_pool() {
    let pipeline = Pipeline::spawn(4).await;

    let poison = SerializedEvent::new("PostLiked.v1".to_string(), vec![0x01, 0x02], None);
    pipeline
        .bus
        .publish(TOPIC, &poison)
        .await
        .expect("publish should succeed");

    // The pool keeps consuming after the poison delivery.
    pipeline.publish_created_and_wait(1).await;

    for _ in 0..500 {
        if pipeline.dead_letters.len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (store, dead_letters) = pipeline.stop().await;
    assert!(store.post(PostId::new(1)).await.is_some());
    assert_eq!(dead_letters.len(), 1);
    let records = dead_letters.records();
    assert_eq!(records[0].event_id, "unknown");
}

#[tokio::test]
async fn test_mixed_flow_converges_to_final_state() {
    let pipeline = Pipeline::spawn(8).await;
    pipeline.publish_created_and_wait(1).await;

    pipeline
        .publish(&PostEventEnvelope::new(PostEvent::PostUpdated {
            post_id: PostId::new(1),
            new_title: "Renamed".to_string(),
            idempotency_key: "post-update:1:rev-2".to_string(),
        }))
        .await;
    pipeline.publish(&liked(1, 1)).await;
    pipeline.publish(&liked(1, 2)).await;
    pipeline
        .publish(&PostEventEnvelope::new(PostEvent::CommentCreated {
            post_id: PostId::new(1),
            idempotency_key: "comment-create:10".to_string(),
        }))
        .await;

    for _ in 0..500 {
        let settled = pipeline.store.post(PostId::new(1)).await.is_some_and(|post| {
            post.title == "Renamed" && post.like_count == 2 && post.comment_count == 1
        });
        if settled {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (store, dead_letters) = pipeline.stop().await;
    let post = store.post(PostId::new(1)).await.expect("post should exist");
    assert_eq!(post.title, "Renamed");
    assert_eq!(post.like_count, 2);
    assert_eq!(post.comment_count, 1);
    assert_eq!(post.view_count, 0, "views only move through record_view");
    assert!(dead_letters.is_empty());
}

#[tokio::test]
async fn test_deleted_post_disappears_from_the_read_model() {
    let pipeline = Pipeline::spawn(4).await;
    pipeline.publish_created_and_wait(1).await;

    pipeline
        .publish(&PostEventEnvelope::new(PostEvent::PostDeleted {
            post_id: PostId::new(1),
            idempotency_key: "post-delete:1".to_string(),
        }))
        .await;

    for _ in 0..500 {
        if pipeline.store.post(PostId::new(1)).await.is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (store, _dead_letters) = pipeline.stop().await;
    assert!(store.post(PostId::new(1)).await.is_none());
    assert_eq!(store.post_count().await, 0);
}

#[tokio::test]
async fn test_shutdown_drains_and_returns_cleanly() {
    let pipeline = Pipeline::spawn(2).await;
    pipeline.publish_created_and_wait(1).await;

    let (store, dead_letters) = pipeline.stop().await;

    assert!(store.post(PostId::new(1)).await.is_some());
    assert!(dead_letters.is_empty());
}
