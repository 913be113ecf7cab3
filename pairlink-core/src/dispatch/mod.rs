//! Inbound message dispatch
//!
//! Single routing point from a decoded [`Envelope`] to its handler, keyed by
//! [`EventKind`]. Adding a protocol message means adding an enum case and a
//! route here; nothing else branches on event kinds.
//!
//! Dispatch is fire-and-forget: each envelope is handled on its own task so
//! the transport delivery loop never waits on a handler, and a handler
//! failure surfaces as a [`ClientEvent::HandshakeFailed`] instead of tearing
//! the loop down.

use crate::channels::{ChannelError, ChannelManager};
use crate::events::{ClientEvent, EventBroadcaster};
use crate::pairing::{PairingEngine, PairingError};
use crate::protocol::{Envelope, EventKind};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Errors surfaced by inbound handlers
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Pairing(#[from] PairingError),
}

/// Routes inbound envelopes to the channel manager or the pairing engine
#[derive(Clone)]
pub struct Dispatcher {
    channels: Arc<ChannelManager>,
    pairing: Arc<PairingEngine>,
    events: EventBroadcaster,
}

impl Dispatcher {
    /// Create a dispatcher over the two handler components
    pub fn new(
        channels: Arc<ChannelManager>,
        pairing: Arc<PairingEngine>,
        events: EventBroadcaster,
    ) -> Self {
        Self {
            channels,
            pairing,
            events,
        }
    }

    /// Hand an envelope to its handler without waiting for completion
    pub fn dispatch(&self, envelope: Envelope) {
        if envelope.event == EventKind::Unknown {
            trace!(peer = %envelope.from, "ignoring unknown event kind");
            return;
        }

        let dispatcher = self.clone();
        tokio::spawn(async move {
            let peer = envelope.from.clone();
            let event = envelope.event;
            if let Err(error) = dispatcher.route(envelope).await {
                warn!(peer = %peer, ?event, %error, "inbound handler failed");
                dispatcher.events.emit(ClientEvent::HandshakeFailed {
                    peer,
                    reason: error.to_string(),
                });
            }
        });
    }

    async fn route(&self, envelope: Envelope) -> Result<(), DispatchError> {
        match envelope.event {
            EventKind::Ping => self.channels.handle_ping(envelope).await?,
            EventKind::Pong => {
                // Reserved: liveness accounting may hang off pong replies
                // one day; today they carry no handler logic.
                debug!(peer = %envelope.from, "pong received");
            }
            EventKind::PublicKeyExchange => {
                self.pairing.handle_public_key_exchange(envelope).await?
            }
            EventKind::EphemeralKeyExchange => {
                self.pairing.handle_ephemeral_key_exchange(envelope).await?
            }
            EventKind::ReadyToTransfer => self.pairing.handle_ready_to_transfer(envelope).await?,
            EventKind::GroupKeyDistribution => self.pairing.handle_group_key(envelope).await?,
            EventKind::Unknown => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{generate_signing_keypair, StandardCrypto};
    use crate::identity::{LocalDevice, MemoryDeviceStore, PeerId};
    use crate::transport::{MemoryRelay, MemoryTransport};

    fn dispatcher() -> (Dispatcher, EventBroadcaster) {
        let (public, private) = generate_signing_keypair();
        let device = LocalDevice {
            long_term_public: public,
            long_term_private: private,
        };

        let events = EventBroadcaster::default();
        let channels = Arc::new(ChannelManager::new(
            PeerId::new("alice"),
            Arc::new(MemoryTransport::new(MemoryRelay::new())),
            events.clone(),
        ));
        let pairing = Arc::new(PairingEngine::new(
            PeerId::new("alice"),
            channels.clone(),
            Arc::new(MemoryDeviceStore::new(device)),
            Arc::new(StandardCrypto::new()),
            events.clone(),
        ));
        (Dispatcher::new(channels, pairing, events.clone()), events)
    }

    #[tokio::test]
    async fn test_unknown_event_is_silently_ignored() {
        let (dispatcher, events) = dispatcher();
        let mut rx = events.subscribe();

        dispatcher.dispatch(Envelope::new(
            PeerId::new("bob"),
            None,
            EventKind::Unknown,
            false,
        ));

        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pong_is_a_no_op() {
        let (dispatcher, events) = dispatcher();
        let mut rx = events.subscribe();

        dispatcher.dispatch(Envelope::new(
            PeerId::new("bob"),
            None,
            EventKind::Pong,
            false,
        ));

        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handler_failure_becomes_error_event() {
        let (dispatcher, events) = dispatcher();
        let mut rx = events.subscribe();

        // Group key with no shared secret: the handler fails, the loop
        // must not — the failure arrives as an event.
        dispatcher.dispatch(
            Envelope::new(
                PeerId::new("bob"),
                Some(PeerId::new("alice")),
                EventKind::GroupKeyDistribution,
                false,
            )
            .with_payload(&crate::protocol::EncryptedKeyPayload::new(&[0u8; 32]))
            .unwrap(),
        );

        let event = rx.recv().await.unwrap();
        match event {
            ClientEvent::HandshakeFailed { peer, reason } => {
                assert_eq!(peer, PeerId::new("bob"));
                assert!(reason.contains("no shared secret"));
            }
            other => panic!("expected HandshakeFailed, got {:?}", other),
        }
    }
}
