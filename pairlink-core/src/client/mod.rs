//! Pairing client
//!
//! One [`Client`] is one device on the relay. It wires the channel manager,
//! pairing engine, and dispatcher together over host-supplied transport,
//! device store, and crypto provider implementations, and exposes the public
//! pairing API plus the domain-event stream.
//!
//! All state lives inside the instance; two clients in one process are fully
//! independent, which is exactly how the end-to-end tests drive both sides
//! of the protocol.

use crate::channels::{ChannelError, ChannelManager};
use crate::config::{Config, ConfigError};
use crate::crypto::CryptoProvider;
use crate::dispatch::Dispatcher;
use crate::events::{ClientEvent, EventBroadcaster};
use crate::identity::{DeviceStore, PeerId};
use crate::pairing::{PairingEngine, PairingError};
use crate::transport::RelayTransport;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

#[cfg(test)]
mod tests;

/// Client-level errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Pairing(#[from] PairingError),
}

/// A device participating in pairing over a relay
pub struct Client {
    id: PeerId,
    config: Config,
    channels: Arc<ChannelManager>,
    pairing: Arc<PairingEngine>,
    events: EventBroadcaster,
}

impl Client {
    /// Create a client over host-supplied collaborators
    ///
    /// When `id` is `None` a random identity is generated, for hosts that
    /// have not yet derived one from their long-term key.
    pub fn new(
        id: Option<PeerId>,
        config: Config,
        transport: Arc<dyn RelayTransport>,
        store: Arc<dyn DeviceStore>,
        crypto: Arc<dyn CryptoProvider>,
    ) -> Result<Self, ClientError> {
        config.validate()?;

        let id = id.unwrap_or_else(PeerId::generate);
        let events = EventBroadcaster::new(config.events.buffer);

        let channels = Arc::new(ChannelManager::new(id.clone(), transport, events.clone()));
        let pairing = Arc::new(PairingEngine::new(
            id.clone(),
            channels.clone(),
            store,
            crypto,
            events.clone(),
        ));

        Ok(Self {
            id,
            config,
            channels,
            pairing,
            events,
        })
    }

    /// The local peer id
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Connect to the relay and start listening on the self-topic
    pub async fn start(&self) -> Result<(), ClientError> {
        info!(
            peer = %self.id,
            relay = %self.config.relay.hostname,
            port = self.config.relay.port,
            "starting pairing client"
        );

        let dispatcher = Dispatcher::new(
            self.channels.clone(),
            self.pairing.clone(),
            self.events.clone(),
        );
        self.channels.start(dispatcher).await?;
        Ok(())
    }

    /// Observe domain events emitted from now on
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Subscribe to a peer's topic and announce interest
    pub async fn subscribe_peer(&self, peer: &PeerId, batched: bool) -> Result<(), ClientError> {
        self.channels.subscribe_peer(peer, batched).await?;
        Ok(())
    }

    /// Subscribe to a list of peers, reporting the outcome per peer
    pub async fn subscribe_peers(
        &self,
        peers: &[PeerId],
    ) -> Vec<(PeerId, Result<(), ChannelError>)> {
        self.channels.subscribe_peers(peers).await
    }

    /// Tear down the channel to a peer
    pub async fn unsubscribe_peer(&self, peer: &PeerId) -> Result<(), ClientError> {
        self.channels.unsubscribe_peer(peer).await?;
        Ok(())
    }

    /// Deterministically elect a master among the given peers and this device
    pub fn elect_master(&self, peers: &[PeerId]) -> PeerId {
        self.channels.elect_master(peers)
    }

    /// Save the out-of-band exchange key before an inbound pairing attempt
    pub async fn save_exchange_key(&self, hex_key: &str) -> Result<(), ClientError> {
        self.pairing.save_exchange_key(hex_key).await?;
        Ok(())
    }

    /// Stage 1: send the local long-term public key to a peer
    pub async fn send_public_key_exchange(
        &self,
        to: &PeerId,
        ack: bool,
        symmetric_key: Option<&str>,
    ) -> Result<(), ClientError> {
        self.pairing
            .send_public_key_exchange(to, ack, symmetric_key)
            .await?;
        Ok(())
    }

    /// Stage 2: send a signed ephemeral key to a peer
    pub async fn send_ephemeral_key_exchange(
        &self,
        to: &PeerId,
        ack: bool,
    ) -> Result<(), ClientError> {
        self.pairing.send_ephemeral_key_exchange(to, ack).await?;
        Ok(())
    }

    /// Stage 4: distribute a group key to a paired peer
    pub async fn send_group_key(&self, to: &PeerId, group_key: &[u8]) -> Result<(), ClientError> {
        self.pairing.send_group_key(to, group_key).await?;
        Ok(())
    }

    /// Shared secret derived with a peer, once pairing reached stage 3
    pub async fn shared_secret(&self, peer: &PeerId) -> Option<Vec<u8>> {
        self.pairing.shared_secret(peer).await
    }

    /// Group key held for a peer, once stage 4 completed
    pub async fn group_key(&self, peer: &PeerId) -> Option<Vec<u8>> {
        self.pairing.group_key(peer).await
    }

    /// Abandon an in-progress pairing attempt with a peer
    pub async fn reset_session(&self, peer: &PeerId) {
        self.pairing.reset_session(peer).await;
    }
}
