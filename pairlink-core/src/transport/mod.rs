//! Relay transport abstraction
//!
//! The relay is a topic-based publish/subscribe service: delivery is in
//! order and at-least-once within one topic, unordered across topics. The
//! channel manager consumes the [`RelayTransport`] trait; hosts plug in a
//! concrete relay client. [`memory::MemoryRelay`] provides an in-process
//! implementation for tests and local development.
//!
//! ```text
//! ChannelManager
//!       |
//!       v
//! RelayTransport (trait)
//!       |
//!       +---> MemoryTransport (in-process relay)
//!       |
//!       +---> host-provided relay client
//! ```

use crate::protocol::Envelope;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod memory;

pub use memory::{MemoryRelay, MemoryTransport};

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// The relay could not be reached or the connection closed before ready
    #[error("relay connection failed: {0}")]
    Connection(String),

    /// The relay rejected a topic subscription
    #[error("subscription to topic '{0}' failed")]
    SubscriptionFailed(String),

    /// A publish was attempted after the topic or connection went away
    #[error("publish on topic '{0}' failed: {1}")]
    Publish(String, String),
}

/// A live subscription to one topic
pub struct Subscription {
    /// Publishes envelopes onto the topic
    pub publisher: Box<dyn TopicPublisher>,
    /// Envelopes the relay delivers for the topic, in order
    pub inbound: mpsc::Receiver<Envelope>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Publish side of one subscribed topic
#[async_trait]
pub trait TopicPublisher: Send + Sync {
    /// Publish an envelope onto the topic
    async fn publish(&self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Tear the subscription down; subsequent publishes fail
    async fn unsubscribe(&self) -> Result<(), TransportError>;
}

/// Connection to a relay service
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Establish the connection; must complete before any subscription
    async fn connect(&self) -> Result<(), TransportError>;

    /// Subscribe to a topic
    ///
    /// `batched` hints that the relay may coalesce this subscription with
    /// others for throughput; relays without batching ignore it.
    async fn subscribe(&self, topic: &str, batched: bool) -> Result<Subscription, TransportError>;
}
