//! Domain event broadcasting
//!
//! Every stage of the pairing protocol that completes (or fails inside the
//! inbound dispatch loop) is announced as a [`ClientEvent`]. Events fan out
//! over a tokio broadcast channel so the host application and any internal
//! subsystems can observe them independently.

use crate::identity::PeerId;
use tokio::sync::broadcast;

/// Events observable by the host application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The relay connection is up and the self-topic is subscribed
    Connected,

    /// A peer channel reached the subscribed state
    ChannelSubscribed { peer: PeerId },

    /// A peer channel was torn down
    ChannelUnsubscribed { peer: PeerId },

    /// A peer's long-term public key was decrypted and stored
    LongTermKeyReceived { peer: PeerId, key: Vec<u8> },

    /// The shared secret with a peer is established on this side
    SharedSecretEstablished { peer: PeerId, key: Vec<u8> },

    /// A group key arrived encrypted under the shared secret
    GroupKeyReceived { peer: PeerId, key: Vec<u8> },

    /// An inbound handler failed; the pairing attempt with this peer
    /// should be considered abandoned
    HandshakeFailed { peer: PeerId, reason: String },
}

impl ClientEvent {
    /// The peer this event concerns, when there is one
    pub fn peer(&self) -> Option<&PeerId> {
        match self {
            ClientEvent::Connected => None,
            ClientEvent::ChannelSubscribed { peer }
            | ClientEvent::ChannelUnsubscribed { peer }
            | ClientEvent::LongTermKeyReceived { peer, .. }
            | ClientEvent::SharedSecretEstablished { peer, .. }
            | ClientEvent::GroupKeyReceived { peer, .. }
            | ClientEvent::HandshakeFailed { peer, .. } => Some(peer),
        }
    }
}

/// Fan-out of [`ClientEvent`]s to any number of subscribers
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBroadcaster {
    /// Create a broadcaster buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers
    ///
    /// Returns the number of subscribers that received it; zero when nobody
    /// is listening, which is not an error.
    pub fn emit(&self, event: ClientEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
