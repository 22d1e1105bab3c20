//! Topic pub/sub event bus for homehub
//!
//! This crate provides the EventBus, the shared broker every component talks
//! through. Each topic is backed by a bounded broadcast buffer. Subscribers
//! either poll their [`Subscription`] for one buffered message at a time, or
//! register a handler with [`EventBus::subscribe_with`] that is invoked on
//! the bus's own delivery task once per message.
//!
//! Delivery is best-effort: a subscriber that falls behind the buffer skips
//! the oldest messages.

use dashmap::DashMap;
use hub_core::{BusPayload, Envelope};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Default buffer capacity per topic
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A unique identifier for a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Normalize a configured topic name: lowercase, spaces become underscores
pub fn normalize_topic(topic: &str) -> String {
    topic.trim().replace(' ', "_").to_lowercase()
}

/// The event bus for publishing and subscribing to topics
pub struct EventBus {
    /// Map of topics to their broadcast senders
    topics: DashMap<String, broadcast::Sender<BusPayload>>,
    /// Counter for generating unique subscription IDs
    next_subscription_id: AtomicU64,
    /// Channel capacity
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with specified per-topic capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            next_subscription_id: AtomicU64::new(1),
            capacity,
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<BusPayload> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(self.capacity);
                tx
            })
            .clone()
    }

    /// Subscribe to a topic
    ///
    /// Only messages published after this call are delivered.
    pub fn subscribe(&self, topic: impl Into<String>) -> Subscription {
        let topic = normalize_topic(&topic.into());
        let id = SubscriptionId(self.next_subscription_id.fetch_add(1, Ordering::SeqCst));
        trace!(topic = %topic, ?id, "Subscribing to topic");

        let rx = self.sender(&topic).subscribe();
        Subscription { id, topic, rx }
    }

    /// Subscribe a handler to a topic
    ///
    /// The handler runs on a dedicated delivery task, once per message, until
    /// the returned handle is dropped or unsubscribed.
    pub fn subscribe_with<F>(&self, topic: impl Into<String>, mut handler: F) -> SubscriptionHandle
    where
        F: FnMut(BusPayload) + Send + 'static,
    {
        let mut subscription = self.subscribe(topic);
        let topic = subscription.topic.clone();

        let task = tokio::spawn(async move {
            loop {
                match subscription.rx.recv().await {
                    Ok(payload) => handler(payload),
                    Err(RecvError::Lagged(n)) => {
                        warn!(topic = %subscription.topic, skipped = n, "Subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(topic = %subscription.topic, "Delivery task finished");
        });

        SubscriptionHandle { topic, task }
    }

    /// Serialize an envelope and broadcast it on a topic
    ///
    /// Returns the number of subscribers the message reached.
    pub fn publish(&self, topic: &str, envelope: &Envelope) -> usize {
        self.publish_payload(topic, BusPayload::Raw(envelope.to_bytes()))
    }

    /// Broadcast a payload as-is on a topic
    pub fn publish_payload(&self, topic: &str, payload: BusPayload) -> usize {
        let topic = normalize_topic(topic);
        debug!(topic = %topic, "Publishing message");
        match self.topics.get(&topic) {
            // Send errors just mean there are no active receivers
            Some(sender) => sender.send(payload).unwrap_or(0),
            None => 0,
        }
    }

    /// Get the number of topics that have been subscribed to
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for EventBus
pub type SharedEventBus = Arc<EventBus>;

/// A polled subscription to one topic
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription {
    id: SubscriptionId,
    topic: String,
    rx: broadcast::Receiver<BusPayload>,
}

impl Subscription {
    /// The subscription's unique id
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The subscribed topic
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receive at most one buffered message, waiting no longer than `timeout`
    pub async fn poll(&mut self, timeout: Duration) -> Option<BusPayload> {
        let deadline = Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Err(_) => return None,
                Ok(Ok(payload)) => return Some(payload),
                Ok(Err(RecvError::Lagged(n))) => {
                    warn!(topic = %self.topic, skipped = n, "Subscriber lagged");
                }
                Ok(Err(RecvError::Closed)) => {
                    // Keep the poll bounded but never spin on a closed topic
                    tokio::time::sleep_until(deadline).await;
                    return None;
                }
            }
        }
    }

    /// Receive one buffered message without waiting
    pub fn try_next(&mut self) -> Option<BusPayload> {
        loop {
            match self.rx.try_recv() {
                Ok(payload) => return Some(payload),
                Err(TryRecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, skipped = n, "Subscriber lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

/// Handle for a handler subscription created by [`EventBus::subscribe_with`]
pub struct SubscriptionHandle {
    topic: String,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// The subscribed topic
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Stop delivering messages to the handler
    pub fn unsubscribe(self) {
        trace!(topic = %self.topic, "Unsubscribing handler");
        // Drop aborts the delivery task
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::EventTag;
    use serde_json::json;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("controls");

        let envelope = Envelope::new(EventTag::ControlUpdate, json!({"button_1": true}));
        assert_eq!(bus.publish("controls", &envelope), 1);

        let received = sub.poll(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(received, BusPayload::Raw(_)));
        assert_eq!(received.decode().unwrap(), envelope);
    }

    #[tokio::test]
    async fn test_structured_payload_is_delivered_as_is() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("controls");

        let envelope = Envelope::new(EventTag::Clear, json!(null));
        bus.publish_payload("controls", BusPayload::Decoded(envelope.clone()));

        assert_eq!(sub.try_next(), Some(BusPayload::Decoded(envelope)));
        assert_eq!(sub.try_next(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("quiet");
        let start = Instant::now();

        assert!(sub.poll(Duration::from_millis(500)).await.is_none());
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_poll_returns_one_message_at_a_time() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("controls");

        bus.publish("controls", &Envelope::new("First", json!(1)));
        bus.publish("controls", &Envelope::new("Second", json!(2)));

        let first = sub.poll(Duration::from_secs(1)).await.unwrap().decode().unwrap();
        assert_eq!(first.data, 1);
        let second = sub.poll(Duration::from_secs(1)).await.unwrap().decode().unwrap();
        assert_eq!(second.data, 2);
    }

    #[tokio::test]
    async fn test_no_cross_topic_pollution() {
        let bus = EventBus::new();
        let mut sub_a = bus.subscribe("topic_a");
        let mut sub_b = bus.subscribe("topic_b");

        bus.publish("topic_a", &Envelope::new("Message", json!({"type": "a"})));

        assert!(sub_a.try_next().is_some());
        assert!(sub_b.try_next().is_none());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish("nobody", &Envelope::new("Clear", json!(null))), 0);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_keeps_newest() {
        let bus = EventBus::with_capacity(2);
        let mut sub = bus.subscribe("controls");

        for n in 0..5 {
            bus.publish("controls", &Envelope::new("ControlUpdate", json!(n)));
        }

        let first = sub.try_next().unwrap().decode().unwrap();
        assert_eq!(first.data, 3);
    }

    #[tokio::test]
    async fn test_subscribe_with_handler() {
        let bus = EventBus::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let received = received.clone();
            bus.subscribe_with("char_display/lcd", move |payload| {
                if let Ok(envelope) = payload.decode() {
                    received.lock().unwrap().push(envelope.event);
                }
            })
        };
        assert_eq!(handle.topic(), "char_display/lcd");

        bus.publish("char_display/lcd", &Envelope::new("Message", json!({})));
        bus.publish("char_display/lcd", &Envelope::new("ClearQueue", json!({})));

        for _ in 0..100 {
            if received.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            *received.lock().unwrap(),
            vec![EventTag::Message, EventTag::ClearQueue]
        );

        handle.unsubscribe();
    }

    #[test]
    fn test_normalize_topic() {
        assert_eq!(normalize_topic("Garden Controls"), "garden_controls");
        assert_eq!(normalize_topic("controls"), "controls");
    }

    #[tokio::test]
    async fn test_topics_are_normalized() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("Garden Controls");
        assert_eq!(sub.topic(), "garden_controls");

        assert_eq!(
            bus.publish("garden_controls", &Envelope::new("ControlUpdate", json!(1))),
            1
        );
        assert!(sub.try_next().is_some());
    }

    #[test]
    fn test_subscription_id_uniqueness() {
        let bus = EventBus::new();
        let a = bus.subscribe("t");
        let b = bus.subscribe("t");
        assert_ne!(a.id(), b.id());
        assert_eq!(bus.topic_count(), 1);
    }
}
