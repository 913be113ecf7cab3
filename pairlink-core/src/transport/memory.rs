//! In-process relay
//!
//! A shared [`MemoryRelay`] stands in for a real relay service: every topic
//! is a broadcast channel, every connected [`MemoryTransport`] is one client.
//! Failure injection hooks cover the connection-refused and
//! subscription-rejected paths that unit tests need.

use super::{RelayTransport, Subscription, TopicPublisher, TransportError};
use crate::protocol::Envelope;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

const TOPIC_CAPACITY: usize = 64;

/// Shared in-process relay state
#[derive(Default)]
pub struct MemoryRelay {
    topics: Mutex<HashMap<String, broadcast::Sender<Envelope>>>,
    denied_topics: Mutex<HashSet<String>>,
    refuse_connections: AtomicBool,
}

impl MemoryRelay {
    /// Create a relay shared by any number of transports
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every subsequent subscription to `topic` fail
    pub fn deny_topic(&self, topic: &str) {
        self.denied_topics
            .lock()
            .expect("relay lock poisoned")
            .insert(topic.to_string());
    }

    /// Make every subsequent connection attempt fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Envelope> {
        self.topics
            .lock()
            .expect("relay lock poisoned")
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    fn topic_denied(&self, topic: &str) -> bool {
        self.denied_topics
            .lock()
            .expect("relay lock poisoned")
            .contains(topic)
    }
}

/// One client connection to a [`MemoryRelay`]
pub struct MemoryTransport {
    relay: Arc<MemoryRelay>,
    connected: AtomicBool,
}

impl MemoryTransport {
    /// Create a transport bound to the given relay
    pub fn new(relay: Arc<MemoryRelay>) -> Self {
        Self {
            relay,
            connected: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl RelayTransport for MemoryTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.relay.refuse_connections.load(Ordering::SeqCst) {
            return Err(TransportError::Connection(
                "relay refused the connection".to_string(),
            ));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, topic: &str, _batched: bool) -> Result<Subscription, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Connection("not connected".to_string()));
        }
        if self.relay.topic_denied(topic) {
            return Err(TransportError::SubscriptionFailed(topic.to_string()));
        }

        let sender = self.relay.sender(topic);
        let mut relay_rx = sender.subscribe();
        let (inbound_tx, inbound) = mpsc::channel(TOPIC_CAPACITY);

        let forward_topic = topic.to_string();
        let forwarder = tokio::spawn(async move {
            loop {
                match relay_rx.recv().await {
                    Ok(envelope) => {
                        if inbound_tx.send(envelope).await.is_err() {
                            // subscriber dropped its receiver
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        trace!(topic = %forward_topic, skipped, "slow subscriber dropped messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription {
            publisher: Box::new(MemoryPublisher {
                topic: topic.to_string(),
                sender,
                forwarder: Mutex::new(Some(forwarder)),
            }),
            inbound,
        })
    }
}

struct MemoryPublisher {
    topic: String,
    sender: broadcast::Sender<Envelope>,
    forwarder: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

#[async_trait]
impl TopicPublisher for MemoryPublisher {
    async fn publish(&self, envelope: &Envelope) -> Result<(), TransportError> {
        // A topic with no live subscribers is not an error for the relay;
        // the message is simply not retained.
        let _ = self.sender.send(envelope.clone());
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), TransportError> {
        if let Some(forwarder) = self
            .forwarder
            .lock()
            .map_err(|_| TransportError::Publish(self.topic.clone(), "lock poisoned".to_string()))?
            .take()
        {
            forwarder.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PeerId;
    use crate::protocol::EventKind;

    fn ping(from: &str) -> Envelope {
        Envelope::new(PeerId::new(from), None, EventKind::Ping, false)
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber_in_order() {
        let relay = MemoryRelay::new();
        let transport = MemoryTransport::new(relay.clone());
        transport.connect().await.unwrap();

        let mut subscription = transport.subscribe("topic-a", false).await.unwrap();
        for from in ["one", "two", "three"] {
            subscription.publisher.publish(&ping(from)).await.unwrap();
        }

        for expected in ["one", "two", "three"] {
            let envelope = subscription.inbound.recv().await.unwrap();
            assert_eq!(envelope.from, PeerId::new(expected));
        }
    }

    #[tokio::test]
    async fn test_subscribe_requires_connection() {
        let transport = MemoryTransport::new(MemoryRelay::new());
        let err = transport.subscribe("topic-a", false).await.unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
    }

    #[tokio::test]
    async fn test_denied_topic_fails_subscription() {
        let relay = MemoryRelay::new();
        relay.deny_topic("forbidden");

        let transport = MemoryTransport::new(relay);
        transport.connect().await.unwrap();

        let err = transport.subscribe("forbidden", false).await.unwrap_err();
        assert!(matches!(err, TransportError::SubscriptionFailed(_)));
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let relay = MemoryRelay::new();
        relay.refuse_connections(true);

        let transport = MemoryTransport::new(relay);
        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
    }

    #[tokio::test]
    async fn test_two_transports_share_a_topic() {
        let relay = MemoryRelay::new();
        let alice = MemoryTransport::new(relay.clone());
        let bob = MemoryTransport::new(relay);
        alice.connect().await.unwrap();
        bob.connect().await.unwrap();

        let mut bob_sub = bob.subscribe("bob", false).await.unwrap();
        let alice_sub = alice.subscribe("bob", false).await.unwrap();

        alice_sub.publisher.publish(&ping("alice")).await.unwrap();

        let envelope = bob_sub.inbound.recv().await.unwrap();
        assert_eq!(envelope.from, PeerId::new("alice"));
    }
}
