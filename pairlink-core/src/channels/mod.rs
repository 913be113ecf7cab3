//! Peer channel management
//!
//! The [`ChannelManager`] owns the mapping from [`PeerId`] to relay topic
//! subscription, the self-channel the device listens on, and the liveness
//! probe that lets two devices discover each other's interest: subscribing
//! to a peer publishes a `ping` on its topic, and an inbound `ping` makes
//! the receiver subscribe back and answer `pong`.
//!
//! Master election lives here too because it operates on the same peer set.

use crate::dispatch::Dispatcher;
use crate::events::{ClientEvent, EventBroadcaster};
use crate::identity::PeerId;
use crate::protocol::{Envelope, EventKind};
use crate::transport::{RelayTransport, TopicPublisher, TransportError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Channel-layer errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The caller passed an empty or unknown peer
    #[error("invalid peer: {0}")]
    InvalidPeer(String),

    /// An envelope was published to a peer without a subscribed channel
    #[error("no subscribed channel for peer: {0}")]
    ChannelNotSubscribed(String),

    /// The transport failed underneath the channel layer
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Lifecycle of one topic subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Created but not yet offered to the transport
    Unsubscribed,
    /// Subscription request in flight
    Subscribing,
    /// Live; envelopes may be published
    Subscribed,
    /// The transport rejected the subscription
    Failed,
}

struct PeerChannel {
    state: ChannelState,
    publisher: Option<Box<dyn TopicPublisher>>,
}

impl PeerChannel {
    fn pending() -> Self {
        Self {
            state: ChannelState::Subscribing,
            publisher: None,
        }
    }

    fn subscribed(publisher: Box<dyn TopicPublisher>) -> Self {
        Self {
            state: ChannelState::Subscribed,
            publisher: Some(publisher),
        }
    }

    fn failed() -> Self {
        Self {
            state: ChannelState::Failed,
            publisher: None,
        }
    }
}

/// Owns peer topic subscriptions and the liveness probe
pub struct ChannelManager {
    local_id: PeerId,
    transport: Arc<dyn RelayTransport>,
    channels: RwLock<HashMap<PeerId, PeerChannel>>,
    events: EventBroadcaster,
}

impl ChannelManager {
    /// Create a manager for the given local identity
    pub fn new(
        local_id: PeerId,
        transport: Arc<dyn RelayTransport>,
        events: EventBroadcaster,
    ) -> Self {
        Self {
            local_id,
            transport,
            channels: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// The local peer id
    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    /// Connect the transport, subscribe the self-topic, and run the inbound
    /// loop
    ///
    /// Every envelope received on the self-topic is handed to `dispatcher`,
    /// except envelopes the device sent itself (relays may loop publishes
    /// back to the publisher).
    pub async fn start(&self, dispatcher: Dispatcher) -> Result<(), ChannelError> {
        self.transport.connect().await?;

        let subscription = self
            .transport
            .subscribe(self.local_id.as_str(), false)
            .await?;

        let mut inbound = subscription.inbound;
        self.channels.write().await.insert(
            self.local_id.clone(),
            PeerChannel::subscribed(subscription.publisher),
        );

        let local_id = self.local_id.clone();
        tokio::spawn(async move {
            while let Some(envelope) = inbound.recv().await {
                if envelope.from == local_id {
                    continue; // echo suppression
                }
                dispatcher.dispatch(envelope);
            }
            debug!(peer = %local_id, "self-channel inbound loop ended");
        });

        info!(peer = %self.local_id, "connected and listening on self-topic");
        self.events.emit(ClientEvent::Connected);
        Ok(())
    }

    /// Subscribe to a peer's topic and announce interest with a `ping`
    ///
    /// Idempotent per peer: re-subscribing replaces the existing channel
    /// entry.
    pub async fn subscribe_peer(&self, peer: &PeerId, batched: bool) -> Result<(), ChannelError> {
        if peer.is_empty() {
            return Err(ChannelError::InvalidPeer(
                "peer id must not be empty".to_string(),
            ));
        }

        self.channels
            .write()
            .await
            .insert(peer.clone(), PeerChannel::pending());

        match self.transport.subscribe(peer.as_str(), batched).await {
            Ok(subscription) => {
                self.channels
                    .write()
                    .await
                    .insert(peer.clone(), PeerChannel::subscribed(subscription.publisher));

                debug!(peer = %peer, "peer channel subscribed");
                self.publish(
                    peer,
                    Envelope::new(self.local_id.clone(), None, EventKind::Ping, false),
                )
                .await?;

                self.events
                    .emit(ClientEvent::ChannelSubscribed { peer: peer.clone() });
                Ok(())
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "peer channel subscription failed");
                self.channels
                    .write()
                    .await
                    .insert(peer.clone(), PeerChannel::failed());
                Err(ChannelError::Transport(e))
            }
        }
    }

    /// Subscribe to a whole peer list, letting each attempt settle
    ///
    /// One peer's failure never cancels the others; the outcome is reported
    /// per peer.
    pub async fn subscribe_peers(
        &self,
        peers: &[PeerId],
    ) -> Vec<(PeerId, Result<(), ChannelError>)> {
        let mut outcomes = Vec::with_capacity(peers.len());
        for peer in peers {
            let outcome = self.subscribe_peer(peer, true).await;
            outcomes.push((peer.clone(), outcome));
        }
        outcomes
    }

    /// Drop the channel for a peer
    pub async fn unsubscribe_peer(&self, peer: &PeerId) -> Result<(), ChannelError> {
        if peer.is_empty() {
            return Err(ChannelError::InvalidPeer(
                "peer id must not be empty".to_string(),
            ));
        }

        let channel = self
            .channels
            .write()
            .await
            .remove(peer)
            .ok_or_else(|| ChannelError::InvalidPeer(format!("unknown peer: {}", peer)))?;

        if let Some(publisher) = channel.publisher {
            publisher.unsubscribe().await?;
        }

        debug!(peer = %peer, "peer channel unsubscribed");
        self.events
            .emit(ClientEvent::ChannelUnsubscribed { peer: peer.clone() });
        Ok(())
    }

    /// Publish an envelope on a peer's channel
    ///
    /// The channel must currently be subscribed.
    pub async fn publish(&self, peer: &PeerId, envelope: Envelope) -> Result<(), ChannelError> {
        let channels = self.channels.read().await;
        let channel = channels
            .get(peer)
            .filter(|c| c.state == ChannelState::Subscribed)
            .ok_or_else(|| ChannelError::ChannelNotSubscribed(peer.to_string()))?;

        let publisher = channel
            .publisher
            .as_ref()
            .ok_or_else(|| ChannelError::ChannelNotSubscribed(peer.to_string()))?;

        publisher.publish(&envelope).await?;
        Ok(())
    }

    /// Handle an inbound liveness probe
    ///
    /// A `ping` from an unknown peer is how a device learns about a new
    /// peer's interest: subscribe back to the sender's topic and answer
    /// `pong` on it.
    pub async fn handle_ping(&self, envelope: Envelope) -> Result<(), ChannelError> {
        let sender = envelope.from;

        let known = self
            .channels
            .read()
            .await
            .get(&sender)
            .map(|c| c.state == ChannelState::Subscribed)
            .unwrap_or(false);

        if !known {
            let subscription = self.transport.subscribe(sender.as_str(), false).await?;
            self.channels
                .write()
                .await
                .insert(sender.clone(), PeerChannel::subscribed(subscription.publisher));
            debug!(peer = %sender, "subscribed back to pinging peer");
            self.events
                .emit(ClientEvent::ChannelSubscribed { peer: sender.clone() });
        }

        self.publish(
            &sender,
            Envelope::new(self.local_id.clone(), None, EventKind::Pong, false),
        )
        .await
    }

    /// Current lifecycle state of a peer's channel
    pub async fn channel_state(&self, peer: &PeerId) -> Option<ChannelState> {
        self.channels.read().await.get(peer).map(|c| c.state)
    }

    /// Number of channel entries, the self-channel included once started
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Deterministically elect a master device
    ///
    /// The local id is appended to the supplied peers and the
    /// lexicographically smallest identity wins. Pure; no channel state is
    /// touched.
    pub fn elect_master(&self, peers: &[PeerId]) -> PeerId {
        let mut candidates: Vec<PeerId> = peers.to_vec();
        candidates.push(self.local_id.clone());
        candidates.sort();
        candidates
            .into_iter()
            .next()
            .unwrap_or_else(|| self.local_id.clone())
    }
}
