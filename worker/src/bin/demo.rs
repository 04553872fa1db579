//! Paperboard Read Model Demo
//!
//! End-to-end demonstration of the projection pipeline showing:
//! - Post creation seeding the denormalized read model
//! - Like/comment events applied as atomic counter deltas
//! - Duplicate delivery skipped by the idempotency ledger
//! - A poison delivery quarantined in the dead-letter store
//! - Graceful shutdown draining in-flight deliveries
//!
//! # Usage
//!
//! ```bash
//! cargo run -p paperboard-worker --bin demo
//! ```

use paperboard_core::event::{PostEvent, PostEventEnvelope, SerializedEvent};
use paperboard_core::event_bus::EventBus;
use paperboard_core::projection::{PostReadModel, ReadModelStore};
use paperboard_core::types::{AuthorId, PostId};
use paperboard_testing::{InMemoryDeadLetterStore, InMemoryEventBus, InMemoryReadModelStore};
use paperboard_worker::{Application, Config};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,paperboard_projections=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("\n📰 ============================================");
    println!("   Paperboard Read Model - Live Demo");
    println!("============================================\n");

    // Load configuration
    let config = Config::from_env();

    // In-memory backends stand in for the broker and Postgres
    let bus = InMemoryEventBus::new();
    let store = InMemoryReadModelStore::new();
    let dead_letters = InMemoryDeadLetterStore::new();

    println!("⚙️  Starting projection worker pool...");
    let app = Application::start(
        &config,
        Arc::new(bus.clone()),
        store.clone(),
        Arc::new(dead_letters.clone()),
    );
    let topic = config.bus.topic.as_str();
    wait_for_subscription(&bus, topic).await?;
    println!("✓ Worker pool subscribed to {topic}\n");

    let post_id = PostId::new(1);

    // ========== Demo Scenario ==========

    println!("📋 Demo Scenario: A Post's Day on the Feed");
    println!("   Post: \"Coffee notes from the roastery floor\"");
    println!("   Author: mina\n");

    // Step 1: the write side publishes PostCreated
    println!("1️⃣  Write side publishes PostCreated...");

    let created = PostEventEnvelope::new(PostEvent::PostCreated {
        post_id,
        title: "Coffee notes from the roastery floor".to_string(),
        author_id: AuthorId::new(3),
        author_name: "mina".to_string(),
        created_at: chrono::Utc::now(),
        idempotency_key: "post-create:1".to_string(),
    });
    publish(&bus, topic, &created).await?;

    let row = settle(&store, post_id, |_| true).await?;
    println!("   ✓ Read-model row seeded: \"{}\"", row.title);
    println!("   ✓ All counters start at zero\n");

    // Step 2: three members like the post
    println!("2️⃣  Three members like the post...");

    let first_like = PostEventEnvelope::new(PostEvent::PostLiked {
        post_id,
        idempotency_key: "post-like:1:member-9".to_string(),
    });
    publish(&bus, topic, &first_like).await?;
    for member in 10..=11 {
        let like = PostEventEnvelope::new(PostEvent::PostLiked {
            post_id,
            idempotency_key: format!("post-like:1:member-{member}"),
        });
        publish(&bus, topic, &like).await?;
    }

    let row = settle(&store, post_id, |row| row.like_count == 3).await?;
    println!("   ✓ like_count: {}\n", row.like_count);

    // Step 3: the bus redelivers one of the likes
    println!("3️⃣  The bus redelivers member-9's like...");

    publish(&bus, topic, &first_like).await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let row = fetch(&store, post_id).await?;
    println!(
        "   ✓ Duplicate skipped by the ledger, like_count still {}\n",
        row.like_count
    );

    // Step 4: a comment lands and one member unlikes
    println!("4️⃣  A comment lands and member-9 unlikes...");

    let comment = PostEventEnvelope::new(PostEvent::CommentCreated {
        post_id,
        idempotency_key: "comment-create:41".to_string(),
    });
    publish(&bus, topic, &comment).await?;
    let unlike = PostEventEnvelope::new(PostEvent::PostUnliked { post_id });
    publish(&bus, topic, &unlike).await?;

    let row = settle(&store, post_id, |row| {
        row.comment_count == 1 && row.like_count == 2
    })
    .await?;
    println!(
        "   ✓ comment_count: {}, like_count: {}\n",
        row.comment_count, row.like_count
    );

    // Step 5: a corrupted delivery arrives
    println!("5️⃣  A corrupted delivery arrives...");

    let poison = SerializedEvent::new(
        "PostLiked.v1".to_string(),
        vec![0xde, 0xad, 0xbe, 0xef],
        None,
    );
    bus.publish(topic, &poison).await?;

    wait_for_quarantine(&dead_letters).await?;
    println!("   ✓ Quarantined without retry, worker pool keeps running\n");

    // Step 6: a reader opens the post; the query layer bumps views
    println!("6️⃣  A reader opens the post...");

    store.record_view(post_id).await?;
    let row = fetch(&store, post_id).await?;
    println!("   ✓ view_count: {} (no event, no ledger entry)\n", row.view_count);

    // ========== Final State ==========

    println!("📊 Final read model:");
    println!("   - Title:    \"{}\"", row.title);
    println!("   - Author:   {} (id {})", row.author_name, row.author_id);
    println!("   - Likes:    {}", row.like_count);
    println!("   - Comments: {}", row.comment_count);
    println!("   - Views:    {}", row.view_count);

    println!("\n📮 Dead letter store:");
    for record in dead_letters.records() {
        println!(
            "   - #{} {} ({}): {}",
            record.id, record.event_id, record.event_type, record.reason
        );
    }

    println!("\n🛑 Stopping worker pool...");
    app.stop().await?;
    println!("✓ Drained and stopped");

    println!("\n✨ Demo completed successfully!");
    println!("\n📝 What happened:");
    println!("   1. PostCreated seeded the denormalized row inside one transaction");
    println!("   2. Each like claimed its idempotency key, then bumped the counter");
    println!("   3. The redelivered like found its key claimed and was skipped");
    println!("   4. Comment and unlike applied as atomic counter deltas");
    println!("   5. The undecodable payload went straight to the dead-letter store");
    println!("   6. Views bypass the event pipeline entirely");

    Ok(())
}

/// Serialize an envelope and publish it to the topic.
async fn publish(
    bus: &InMemoryEventBus,
    topic: &str,
    envelope: &PostEventEnvelope,
) -> anyhow::Result<()> {
    bus.publish(topic, &envelope.to_serialized()?).await?;
    Ok(())
}

/// Poll until the worker pool has attached its subscription.
async fn wait_for_subscription(bus: &InMemoryEventBus, topic: &str) -> anyhow::Result<()> {
    for _ in 0..200 {
        if bus.subscriber_count(topic) > 0 {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    anyhow::bail!("worker pool never subscribed to {topic}")
}

/// Poll until the post's read-model row exists and satisfies `check`.
async fn settle<F>(
    store: &InMemoryReadModelStore,
    post_id: PostId,
    check: F,
) -> anyhow::Result<PostReadModel>
where
    F: Fn(&PostReadModel) -> bool,
{
    for _ in 0..400 {
        match store.post(post_id).await {
            Some(row) if check(&row) => return Ok(row),
            _ => tokio::time::sleep(Duration::from_millis(5)).await,
        }
    }
    anyhow::bail!("read model did not settle within 2 seconds")
}

/// Fetch the post's read-model row, failing if it is missing.
async fn fetch(store: &InMemoryReadModelStore, post_id: PostId) -> anyhow::Result<PostReadModel> {
    store
        .post(post_id)
        .await
        .ok_or_else(|| anyhow::anyhow!("post {post_id} has no read-model row"))
}

/// Poll until the poison delivery shows up in quarantine.
async fn wait_for_quarantine(dead_letters: &InMemoryDeadLetterStore) -> anyhow::Result<()> {
    for _ in 0..400 {
        if !dead_letters.is_empty() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    anyhow::bail!("poison delivery never reached the dead-letter store")
}
