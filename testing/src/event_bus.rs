//! In-memory event bus for tests and demos.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test infrastructure uses unwrap/expect for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use paperboard_core::event::SerializedEvent;
use paperboard_core::event_bus::{EventBus, EventBusError, EventStream};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};

const DEFAULT_BUFFER_SIZE: usize = 1024;

/// In-memory event bus backed by per-topic broadcast channels.
///
/// Mirrors the transport contract closely enough for end-to-end tests:
/// every active subscriber of a topic receives every event published to it,
/// and redelivery is simulated by simply publishing the same serialized
/// event again.
///
/// Like a real broker consumed from `latest`, events published before a
/// subscription exist only for subscribers that were already attached;
/// subscribe first, then publish.
///
/// # Example
///
/// ```
/// use paperboard_testing::InMemoryEventBus;
/// use paperboard_core::event::SerializedEvent;
/// use paperboard_core::event_bus::EventBus;
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryEventBus::new();
/// let mut stream = bus.subscribe(&["post-events"]).await?;
///
/// let event = SerializedEvent::new("PostLiked.v1".to_string(), vec![1, 2, 3], None);
/// bus.publish("post-events", &event).await?;
///
/// let received = stream.next().await.expect("stream should yield")?;
/// assert_eq!(received.event_type, "PostLiked.v1");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryEventBus {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<SerializedEvent>>>>,
    buffer_size: usize,
}

impl InMemoryEventBus {
    /// Create a new bus with the default per-topic buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new bus with an explicit per-topic buffer size.
    ///
    /// Small buffers are useful for exercising slow-subscriber behavior.
    #[must_use]
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            buffer_size,
        }
    }

    /// Number of active subscriptions on a topic.
    ///
    /// Lets tests wait for a consumer task to attach before publishing,
    /// since events published with no subscriber are dropped.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .unwrap()
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<SerializedEvent> {
        self.topics
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .clone()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let sender = self.sender_for(topic);
        let event = event.clone();

        Box::pin(async move {
            // A send error just means no subscriber is attached; the
            // publish itself still succeeds, matching a broker with no
            // consumer group yet.
            let _ = sender.send(event);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let receivers: Vec<broadcast::Receiver<SerializedEvent>> = topics
            .iter()
            .map(|topic| self.sender_for(topic).subscribe())
            .collect();
        let buffer_size = self.buffer_size;

        Box::pin(async move {
            // Forward every topic receiver into one channel so the caller
            // sees a single merged stream.
            let (tx, rx) = mpsc::channel(buffer_size);

            for mut receiver in receivers {
                let tx = tx.clone();
                tokio::spawn(async move {
                    loop {
                        match receiver.recv().await {
                            Ok(event) => {
                                if tx.send(Ok(event)).await.is_err() {
                                    break; // Subscriber dropped the stream
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(missed)) => {
                                let err = EventBusError::Other(format!(
                                    "Subscriber lagged, {missed} events dropped"
                                ));
                                if tx.send(Err(err)).await.is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                });
            }
            drop(tx);

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn test_event(event_type: &str) -> SerializedEvent {
        SerializedEvent::new(event_type.to_string(), b"payload".to_vec(), None)
    }

    #[test]
    fn in_memory_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<InMemoryEventBus>();
        assert_sync::<InMemoryEventBus>();
    }

    #[tokio::test]
    async fn delivers_to_all_subscribers() {
        let bus = InMemoryEventBus::new();
        let mut first = bus.subscribe(&["post-events"]).await.unwrap();
        let mut second = bus.subscribe(&["post-events"]).await.unwrap();

        bus.publish("post-events", &test_event("PostCreated.v1"))
            .await
            .unwrap();

        let a = first.next().await.unwrap().unwrap();
        let b = second.next().await.unwrap().unwrap();
        assert_eq!(a.event_type, "PostCreated.v1");
        assert_eq!(b.event_type, "PostCreated.v1");
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = InMemoryEventBus::new();
        let mut posts = bus.subscribe(&["post-events"]).await.unwrap();

        bus.publish("unrelated", &test_event("Noise.v1"))
            .await
            .unwrap();
        bus.publish("post-events", &test_event("PostLiked.v1"))
            .await
            .unwrap();

        let received = posts.next().await.unwrap().unwrap();
        assert_eq!(
            received.event_type, "PostLiked.v1",
            "Subscriber must only see its own topic"
        );
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let bus = InMemoryEventBus::new();
        bus.publish("post-events", &test_event("PostCreated.v1"))
            .await
            .expect("publish with no subscribers should not error");
    }

    #[tokio::test]
    async fn subscriber_count_tracks_attached_streams() {
        let bus = InMemoryEventBus::new();
        assert_eq!(bus.subscriber_count("post-events"), 0);

        let stream = bus.subscribe(&["post-events"]).await.unwrap();
        assert_eq!(bus.subscriber_count("post-events"), 1);

        drop(stream);
    }

    #[tokio::test]
    async fn subscribe_merges_multiple_topics() {
        let bus = InMemoryEventBus::new();
        let mut merged = bus.subscribe(&["posts", "comments"]).await.unwrap();

        bus.publish("posts", &test_event("PostCreated.v1"))
            .await
            .unwrap();
        bus.publish("comments", &test_event("CommentCreated.v1"))
            .await
            .unwrap();

        let mut seen = vec![
            merged.next().await.unwrap().unwrap().event_type,
            merged.next().await.unwrap().unwrap().event_type,
        ];
        seen.sort();
        assert_eq!(seen, vec!["CommentCreated.v1", "PostCreated.v1"]);
    }
}
