//! Event publisher seam and an in-memory implementation.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use futures_core::Stream;
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};

use crate::event::{EventEnvelope, EventId};

/// Errors a publisher can report for a single event.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// The transport could not be reached.
    #[error("Event transport unavailable: {0}")]
    Unavailable(String),

    /// The transport refused the event.
    #[error("Event rejected: {0}")]
    Rejected(String),
}

/// An event that failed to publish after its commit had already succeeded.
///
/// The data is durable; only delivery failed. This is reported and logged,
/// never used to undo the commit.
#[derive(Debug, Clone, Error)]
#[error("Failed to publish {event_type} ({event_id}) for aggregate {aggregate_id} after commit: {source}")]
pub struct PostCommitPublishError {
    pub event_id: EventId,
    pub event_type: String,
    pub aggregate_id: AggregateId,
    #[source]
    pub source: PublishError,
}

impl PostCommitPublishError {
    pub fn new(envelope: &EventEnvelope, source: PublishError) -> Self {
        Self {
            event_id: envelope.event_id,
            event_type: envelope.event_type.clone(),
            aggregate_id: envelope.aggregate_id,
            source,
        }
    }
}

/// Delivers committed events to subscribers.
///
/// Delivery is at-least-once; subscribers must tolerate duplicates.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), PublishError>;
}

#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), PublishError> {
        (**self).publish(event).await
    }
}

/// A stream of published events.
pub type EventStream = Pin<Box<dyn Stream<Item = EventEnvelope> + Send>>;

const SUBSCRIBER_CAPACITY: usize = 1024;

/// In-process publisher.
///
/// Keeps a log of everything published and fans events out to live
/// subscribers. Clones share the log and the subscriber list.
#[derive(Clone)]
pub struct InMemoryEventPublisher {
    published: Arc<RwLock<Vec<EventEnvelope>>>,
    sender: broadcast::Sender<EventEnvelope>,
}

impl Default for InMemoryEventPublisher {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            published: Arc::new(RwLock::new(Vec::new())),
            sender,
        }
    }
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every envelope published so far, in publish order.
    pub async fn published(&self) -> Vec<EventEnvelope> {
        self.published.read().await.clone()
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    /// Returns the types of published events, in publish order.
    pub async fn published_types(&self) -> Vec<String> {
        self.published
            .read()
            .await
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Streams events published after this call.
    ///
    /// A subscriber that falls more than the channel capacity behind skips
    /// the events it missed.
    pub fn subscribe(&self) -> EventStream {
        use futures_util::stream;

        let receiver = self.sender.subscribe();
        let stream = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((event, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Box::pin(stream)
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), PublishError> {
        self.published.write().await.push(event.clone());
        // No live subscribers is not a failure; the log still has the event.
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}
