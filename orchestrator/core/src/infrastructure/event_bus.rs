// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Topic Pub/Sub for Fabric Events
//
// `EventBus` stamps and serializes `Event` envelopes and hands them to a
// `BusTransport`. The in-process `InMemoryBroker` keeps one tokio broadcast
// channel per topic; the orchestrator daemon is the broker and agents reach
// it through the remote transport in crewlink-sdk.
//
// Delivery is at-most-once and transient: subscribers only see events
// published while they are subscribed.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::error::FabricError;
use crate::domain::events::{topics, Event};

/// Raw wire messages, one serialized `Event` each.
pub type WireStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Decoded events. Ends when the transport closes.
pub type EventStream = Pin<Box<dyn Stream<Item = Event> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Bus unavailable: {0}")]
    Unavailable(String),

    #[error("Bus rejected message: {0}")]
    Rejected(String),
}

impl From<TransportError> for FabricError {
    fn from(err: TransportError) -> Self {
        FabricError::Transport(err.to_string())
    }
}

/// Moves serialized events between publishers and subscribers.
#[async_trait]
pub trait BusTransport: Send + Sync {
    /// Returns the number of subscribers that received the message, when the
    /// transport can tell.
    async fn publish(&self, topic: &str, message: String) -> Result<usize, TransportError>;

    /// Dropping the returned stream unsubscribes.
    async fn subscribe(&self, topic: &str) -> Result<WireStream, TransportError>;
}

/// In-process broker: one broadcast channel per topic.
#[derive(Clone)]
pub struct InMemoryBroker {
    topics: Arc<DashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
}

impl InMemoryBroker {
    /// `capacity` is the per-topic buffer; slower subscribers skip ahead.
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of topics with at least one live subscriber.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Live subscription to one topic. Prunes the topic on drop once no other
/// receiver remains.
struct Subscription {
    receiver: Option<broadcast::Receiver<String>>,
    topics: Arc<DashMap<String, broadcast::Sender<String>>>,
    topic: String,
}

impl Subscription {
    async fn next(&mut self) -> Option<String> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "Subscriber lagged, events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        drop(self.receiver.take());
        self.topics
            .remove_if(&self.topic, |_, sender| sender.receiver_count() == 0);
        debug!(topic = %self.topic, "Unsubscribed");
    }
}

#[async_trait]
impl BusTransport for InMemoryBroker {
    async fn publish(&self, topic: &str, message: String) -> Result<usize, TransportError> {
        let Some(sender) = self.topics.get(topic) else {
            debug!(topic, "No subscribers listening on topic");
            return Ok(0);
        };
        // A send error only means every receiver went away since the lookup.
        Ok(sender.send(message).unwrap_or(0))
    }

    async fn subscribe(&self, topic: &str) -> Result<WireStream, TransportError> {
        let receiver = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        let subscription = Subscription {
            receiver: Some(receiver),
            topics: Arc::clone(&self.topics),
            topic: topic.to_string(),
        };

        let stream = futures::stream::unfold(subscription, |mut subscription| async move {
            let message = subscription.next().await?;
            Some((message, subscription))
        });
        Ok(Box::pin(stream))
    }
}

/// Publishes and subscribes to `Event` envelopes on named topics.
#[derive(Clone)]
pub struct EventBus {
    transport: Arc<dyn BusTransport>,
    sender_id: String,
}

impl EventBus {
    pub fn new(transport: Arc<dyn BusTransport>, sender_id: impl Into<String>) -> Self {
        Self {
            transport,
            sender_id: sender_id.into(),
        }
    }

    /// Bus backed by a fresh in-process broker.
    pub fn in_memory(capacity: usize, sender_id: impl Into<String>) -> Self {
        Self::new(Arc::new(InMemoryBroker::new(capacity)), sender_id)
    }

    /// Same transport, different publisher identity.
    pub fn with_sender(&self, sender_id: impl Into<String>) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            sender_id: sender_id.into(),
        }
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Build, stamp and publish an event. Never waits on subscribers.
    ///
    /// Publishing the same payload again is safe; each call gets a new id.
    pub async fn publish(
        &self,
        topic: &str,
        message_type: &str,
        payload: serde_json::Value,
        correlation_id: Option<String>,
    ) -> Result<Event, FabricError> {
        let event = Event::new(self.sender_id.clone(), message_type, payload, correlation_id);
        self.publish_event(topic, &event).await?;
        Ok(event)
    }

    /// Publish an already stamped event, e.g. one relayed from a remote agent.
    pub async fn publish_event(&self, topic: &str, event: &Event) -> Result<usize, FabricError> {
        if !topics::is_valid(topic) {
            return Err(FabricError::Validation(format!("invalid topic name '{topic}'")));
        }

        let wire = event
            .to_wire()
            .map_err(|e| FabricError::Internal(format!("failed to serialize event: {e}")))?;

        match self.transport.publish(topic, wire).await {
            Ok(delivered) => {
                metrics::counter!("crewlink_bus_events_published_total",
                    "message_type" => event.message_type.clone())
                .increment(1);
                debug!(
                    topic,
                    event_id = %event.id,
                    message_type = %event.message_type,
                    delivered,
                    "Published event"
                );
                Ok(delivered)
            }
            Err(e) => {
                metrics::counter!("crewlink_bus_publish_failures_total").increment(1);
                warn!(topic, event_id = %event.id, error = %e, "Failed to publish event");
                Err(e.into())
            }
        }
    }

    /// Lazily consume events on `topic`. Messages that do not decode as an
    /// `Event` are logged and skipped.
    pub async fn subscribe(&self, topic: &str) -> Result<EventStream, FabricError> {
        let topic_name = topic.to_string();
        let raw = self.subscribe_raw(topic).await?;
        let stream = raw.filter_map(move |message| {
            let decoded = match Event::from_wire(&message) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(topic = %topic_name, error = %e, "Dropping undecodable bus message");
                    None
                }
            };
            futures::future::ready(decoded)
        });
        Ok(Box::pin(stream))
    }

    /// Undecoded wire messages, for relaying to remote subscribers.
    pub async fn subscribe_raw(&self, topic: &str) -> Result<WireStream, FabricError> {
        if !topics::is_valid(topic) {
            return Err(FabricError::Validation(format!("invalid topic name '{topic}'")));
        }
        Ok(self.transport.subscribe(topic).await?)
    }
}
