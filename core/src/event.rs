//! Domain events for post read-model synchronization.
//!
//! The write side publishes one event per aggregate mutation on successful
//! commit. Events are immutable facts, delivered at least once and in no
//! particular order, so everything downstream is built to tolerate duplicates
//! and interleaving.
//!
//! # Design
//!
//! Events are serialized with `bincode` for compact storage and fast
//! encode/decode. The [`PostEventEnvelope`] wraps each event with a stable
//! [`EventId`](crate::types::EventId) assigned once at publish time; that
//! identifier survives every retry and redelivery, which is what allows
//! idempotency keys to be synthesized for event types that carry no natural
//! key of their own.
//!
//! # Example
//!
//! ```
//! use paperboard_core::event::{Event, PostEvent, PostEventEnvelope};
//! use paperboard_core::types::PostId;
//!
//! let event = PostEvent::PostLiked {
//!     post_id: PostId::new(5),
//!     idempotency_key: "post-like:5:member-9".to_string(),
//! };
//! assert_eq!(event.event_type(), "PostLiked.v1");
//!
//! let envelope = PostEventEnvelope::new(event);
//! assert_eq!(envelope.idempotency_key(), "post-like:5:member-9");
//! ```

use crate::types::{AuthorId, EventId, PostId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),

    /// Unknown event type encountered during deserialization.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

/// An event that can be published on the bus and applied to a read model.
///
/// # Event Naming Convention
///
/// The `event_type()` method returns a stable string identifier with a
/// version suffix, allowing schema evolution over time:
///
/// - `"PostCreated.v1"`
/// - `"PostLiked.v1"`
/// - `"PostUpdated.v2"` (after a schema change)
///
/// # Serialization
///
/// Events are serialized to binary format using `bincode`. The trait provides
/// default implementations that work for any type implementing `Serialize`
/// and `DeserializeOwned`.
pub trait Event: Send + Sync + 'static {
    /// Returns the event type identifier for this event.
    ///
    /// This string is stored alongside the payload and used for routing
    /// without deserializing the body.
    fn event_type(&self) -> &'static str;

    /// Serialize this event to bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be
    /// serialized, which is rare with bincode.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        bincode::serialize(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes are corrupted,
    /// represent a different event type, or the schema changed incompatibly.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        bincode::deserialize(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// Write-side mutations of a post, as observed by the read model.
///
/// Four event types carry a natural idempotency key derived deterministically
/// by the originating write operation, so redelivery reproduces the same key.
/// `PostUnliked` and `CommentDeleted` carry none; their keys are synthesized
/// from the envelope's stable event id (see
/// [`PostEventEnvelope::idempotency_key`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PostEvent {
    /// A post was created. Seeds the read-model row with zeroed counters.
    PostCreated {
        /// Write-side post key.
        post_id: PostId,
        /// Title at creation time.
        title: String,
        /// Author snapshot: id.
        author_id: AuthorId,
        /// Author snapshot: display name.
        author_name: String,
        /// Creation timestamp from the write side.
        created_at: DateTime<Utc>,
        /// Natural idempotency key.
        idempotency_key: String,
    },

    /// The post title was changed.
    PostUpdated {
        /// Write-side post key.
        post_id: PostId,
        /// Replacement title.
        new_title: String,
        /// Natural idempotency key.
        idempotency_key: String,
    },

    /// A member liked the post.
    PostLiked {
        /// Write-side post key.
        post_id: PostId,
        /// Natural idempotency key.
        idempotency_key: String,
    },

    /// A member withdrew a like. Carries no natural key.
    PostUnliked {
        /// Write-side post key.
        post_id: PostId,
    },

    /// A comment was added under the post.
    CommentCreated {
        /// Write-side post key.
        post_id: PostId,
        /// Natural idempotency key.
        idempotency_key: String,
    },

    /// A comment under the post was removed. Carries no natural key.
    CommentDeleted {
        /// Write-side post key.
        post_id: PostId,
    },

    /// The post was hard-deleted on the write side; the read-model row goes
    /// away with it.
    PostDeleted {
        /// Write-side post key.
        post_id: PostId,
        /// Natural idempotency key.
        idempotency_key: String,
    },
}

impl PostEvent {
    /// The post this event targets.
    #[must_use]
    pub const fn post_id(&self) -> PostId {
        match self {
            Self::PostCreated { post_id, .. }
            | Self::PostUpdated { post_id, .. }
            | Self::PostLiked { post_id, .. }
            | Self::PostUnliked { post_id }
            | Self::CommentCreated { post_id, .. }
            | Self::CommentDeleted { post_id }
            | Self::PostDeleted { post_id, .. } => *post_id,
        }
    }

    /// The natural idempotency key, for event types that carry one.
    #[must_use]
    pub fn natural_key(&self) -> Option<&str> {
        match self {
            Self::PostCreated {
                idempotency_key, ..
            }
            | Self::PostUpdated {
                idempotency_key, ..
            }
            | Self::PostLiked {
                idempotency_key, ..
            }
            | Self::CommentCreated {
                idempotency_key, ..
            }
            | Self::PostDeleted {
                idempotency_key, ..
            } => Some(idempotency_key),
            Self::PostUnliked { .. } | Self::CommentDeleted { .. } => None,
        }
    }
}

impl Event for PostEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::PostCreated { .. } => "PostCreated.v1",
            Self::PostUpdated { .. } => "PostUpdated.v1",
            Self::PostLiked { .. } => "PostLiked.v1",
            Self::PostUnliked { .. } => "PostUnliked.v1",
            Self::CommentCreated { .. } => "CommentCreated.v1",
            Self::CommentDeleted { .. } => "CommentDeleted.v1",
            Self::PostDeleted { .. } => "PostDeleted.v1",
        }
    }
}

/// A published event together with its stable delivery identity.
///
/// The envelope is what travels on the bus. Its `event_id` is minted exactly
/// once, when the write side publishes; redeliveries re-send the same bytes
/// and therefore the same id. Regenerating the id per delivery would make
/// duplicates of the key-less event types undetectable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PostEventEnvelope {
    /// Stable publish-time identity, constant across redeliveries.
    pub event_id: EventId,

    /// When the write side published the event.
    pub occurred_at: DateTime<Utc>,

    /// The domain event itself.
    pub event: PostEvent,
}

impl PostEventEnvelope {
    /// Wrap an event for publishing, minting a fresh event id.
    #[must_use]
    pub fn new(event: PostEvent) -> Self {
        Self {
            event_id: EventId::new(),
            occurred_at: Utc::now(),
            event,
        }
    }

    /// Reconstruct an envelope with known identity, e.g. when replaying from
    /// the dead-letter store.
    #[must_use]
    pub const fn with_identity(
        event_id: EventId,
        occurred_at: DateTime<Utc>,
        event: PostEvent,
    ) -> Self {
        Self {
            event_id,
            occurred_at,
            event,
        }
    }

    /// The idempotency key for this delivery.
    ///
    /// Event types with a natural key return it unchanged. `PostUnliked` and
    /// `CommentDeleted` get a key derived from the stable envelope id, so the
    /// same logical event always produces the same key no matter how many
    /// times it is delivered.
    ///
    /// # Example
    ///
    /// ```
    /// use paperboard_core::event::{PostEvent, PostEventEnvelope};
    /// use paperboard_core::types::PostId;
    ///
    /// let envelope = PostEventEnvelope::new(PostEvent::PostUnliked {
    ///     post_id: PostId::new(5),
    /// });
    /// assert_eq!(
    ///     envelope.idempotency_key(),
    ///     format!("post-unliked:{}", envelope.event_id)
    /// );
    /// ```
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        match &self.event {
            PostEvent::PostUnliked { .. } => format!("post-unliked:{}", self.event_id),
            PostEvent::CommentDeleted { .. } => format!("comment-deleted:{}", self.event_id),
            other => other
                .natural_key()
                .map(ToString::to_string)
                .unwrap_or_default(),
        }
    }

    /// Serialize into the wire format for the event bus.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if encoding fails.
    pub fn to_serialized(&self) -> Result<SerializedEvent, EventError> {
        Ok(SerializedEvent::new(
            self.event.event_type().to_string(),
            self.to_bytes()?,
            None,
        ))
    }

    /// Decode an envelope from a bus delivery.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the payload cannot be
    /// decoded.
    pub fn from_serialized(serialized: &SerializedEvent) -> Result<Self, EventError> {
        Self::from_bytes(&serialized.data)
    }
}

impl Event for PostEventEnvelope {
    fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}

/// A serialized event ready for transport or storage.
///
/// Contains the event type name for routing, the bincode payload, and
/// optional metadata (correlation ids and the like) in JSON form.
#[derive(Clone, Debug)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., `"PostCreated.v1"`).
    pub event_type: String,

    /// The bincode-serialized envelope.
    pub data: Vec<u8>,

    /// Optional metadata in JSON format.
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            data,
            metadata,
        }
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, size: {} bytes }}",
            self.event_type,
            self.data.len()
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn liked(post_id: i64, key: &str) -> PostEvent {
        PostEvent::PostLiked {
            post_id: PostId::new(post_id),
            idempotency_key: key.to_string(),
        }
    }

    #[test]
    fn event_type_strings_are_versioned() {
        let created = PostEvent::PostCreated {
            post_id: PostId::new(1),
            title: "hello".to_string(),
            author_id: AuthorId::new(7),
            author_name: "mina".to_string(),
            created_at: Utc::now(),
            idempotency_key: "post-create:1".to_string(),
        };
        assert_eq!(created.event_type(), "PostCreated.v1");
        assert_eq!(
            PostEvent::PostUnliked {
                post_id: PostId::new(1)
            }
            .event_type(),
            "PostUnliked.v1"
        );
        assert_eq!(
            PostEvent::CommentDeleted {
                post_id: PostId::new(1)
            }
            .event_type(),
            "CommentDeleted.v1"
        );
    }

    #[test]
    fn natural_key_present_only_where_defined() {
        assert_eq!(liked(1, "k").natural_key(), Some("k"));
        assert_eq!(
            PostEvent::PostUnliked {
                post_id: PostId::new(1)
            }
            .natural_key(),
            None
        );
        assert_eq!(
            PostEvent::CommentDeleted {
                post_id: PostId::new(1)
            }
            .natural_key(),
            None
        );
    }

    #[test]
    fn envelope_roundtrips_through_wire_format() {
        let envelope = PostEventEnvelope::new(liked(5, "post-like:5:member-9"));
        let serialized = envelope.to_serialized().unwrap();
        assert_eq!(serialized.event_type, "PostLiked.v1");

        let decoded = PostEventEnvelope::from_serialized(&serialized).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn synthesized_key_is_stable_across_redelivery() {
        let envelope = PostEventEnvelope::new(PostEvent::PostUnliked {
            post_id: PostId::new(5),
        });
        let first_delivery = envelope.to_serialized().unwrap();
        let second_delivery = envelope.to_serialized().unwrap();

        let a = PostEventEnvelope::from_serialized(&first_delivery).unwrap();
        let b = PostEventEnvelope::from_serialized(&second_delivery).unwrap();
        assert_eq!(a.idempotency_key(), b.idempotency_key());
    }

    #[test]
    fn distinct_unlike_events_get_distinct_keys() {
        let first = PostEventEnvelope::new(PostEvent::PostUnliked {
            post_id: PostId::new(5),
        });
        let second = PostEventEnvelope::new(PostEvent::PostUnliked {
            post_id: PostId::new(5),
        });
        assert_ne!(first.idempotency_key(), second.idempotency_key());
    }

    #[test]
    fn malformed_bytes_fail_to_decode() {
        let serialized =
            SerializedEvent::new("PostLiked.v1".to_string(), vec![0xff, 0x00, 0x13], None);
        assert!(matches!(
            PostEventEnvelope::from_serialized(&serialized),
            Err(EventError::DeserializationError(_))
        ));
    }

    proptest! {
        #[test]
        fn idempotency_key_survives_serialization(post_id in i64::MIN..i64::MAX, key in "[a-z0-9:-]{1,64}") {
            let envelope = PostEventEnvelope::new(liked(post_id, &key));
            let decoded =
                PostEventEnvelope::from_serialized(&envelope.to_serialized().unwrap()).unwrap();
            prop_assert_eq!(decoded.idempotency_key(), envelope.idempotency_key());
            prop_assert_eq!(decoded.event_id, envelope.event_id);
        }
    }
}
