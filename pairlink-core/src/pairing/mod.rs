//! Pairing and key-exchange engine
//!
//! Drives the four-stage protocol that takes two devices from "share one
//! out-of-band secret" to "hold a distributed group key":
//!
//! 1. **Long-term key exchange** — each device's long-term public key
//!    crosses the relay encrypted under the out-of-band exchange key.
//! 2. **Ephemeral key exchange** — fresh X25519 public keys cross signed by
//!    the long-term keys; the signature check is the sole authentication
//!    gate.
//! 3. **Shared secret derivation** — ECDH over the ephemeral keys, HKDF to
//!    an AEAD key. Not a wire event.
//! 4. **Group key distribution** — a symmetric session key crosses
//!    encrypted under the derived shared secret.
//!
//! All stages are keyed by the counterpart [`PeerId`]: every peer gets its
//! own [`HandshakeSession`] behind its own mutex, so concurrent pairings
//! with distinct peers never touch each other's key material, while steps
//! for the same peer serialize.

use crate::channels::{ChannelError, ChannelManager};
use crate::crypto::{AgreementKeypair, CryptoError, CryptoProvider, AEAD_KEY_LEN};
use crate::events::{ClientEvent, EventBroadcaster};
use crate::identity::{DeviceRecord, DeviceStore, PeerId, StoreError};
use crate::protocol::{EncryptedKeyPayload, Envelope, EventKind, PayloadError, SignedKeyPayload};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Pairing-protocol errors
#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    /// Stage 1 was invoked with no exchange key supplied or saved
    #[error("no exchange key available for peer: {0}")]
    MissingExchangeKey(String),

    /// Stage 3 was invoked before a local ephemeral keypair existed
    #[error("no ephemeral private key in session for peer: {0}")]
    MissingPrivateKey(String),

    /// Stage 4 was invoked before the shared secret was derived
    #[error("no shared secret established with peer: {0}")]
    NoSharedSecret(String),

    /// Stage 2 arrived from a peer whose long-term key was never stored
    #[error("no long-term key stored for peer: {0}")]
    UnknownPeerKey(String),

    /// A peer's ephemeral key signature did not verify against its stored
    /// long-term key; the pairing attempt must be abandoned
    #[error("signature verification failed for peer: {0}")]
    SignatureVerification(String),

    /// Cryptographic failure (decryption failures land here)
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Device store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Channel-layer failure while publishing
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Malformed inbound payload
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Per-peer state accumulated while pairing
///
/// Fields are populated strictly in stage order; nothing reads a field
/// before the message step that produces it has run.
#[derive(Default)]
pub struct HandshakeSession {
    /// Short-lived symmetric key protecting the long-term key exchange
    exchange_key: Option<Vec<u8>>,
    /// Fresh X25519 keypair, one per pairing attempt
    ephemeral: Option<AgreementKeypair>,
    /// ECDH-derived symmetric key
    shared_secret: Option<Vec<u8>>,
    /// Group key received or sent over the shared secret
    group_key: Option<Vec<u8>>,
}

/// The pairing state machine
pub struct PairingEngine {
    local_id: PeerId,
    channels: Arc<ChannelManager>,
    store: Arc<dyn DeviceStore>,
    crypto: Arc<dyn CryptoProvider>,
    sessions: RwLock<HashMap<PeerId, Arc<Mutex<HandshakeSession>>>>,
    /// Exchange key saved out-of-band before the initiating peer's id is
    /// known; installed into that peer's session on first use
    pending_exchange_key: Mutex<Option<Vec<u8>>>,
    events: EventBroadcaster,
}

impl PairingEngine {
    /// Create an engine for the given local identity
    pub fn new(
        local_id: PeerId,
        channels: Arc<ChannelManager>,
        store: Arc<dyn DeviceStore>,
        crypto: Arc<dyn CryptoProvider>,
        events: EventBroadcaster,
    ) -> Self {
        Self {
            local_id,
            channels,
            store,
            crypto,
            sessions: RwLock::new(HashMap::new()),
            pending_exchange_key: Mutex::new(None),
            events,
        }
    }

    async fn session(&self, peer: &PeerId) -> Arc<Mutex<HandshakeSession>> {
        self.sessions
            .write()
            .await
            .entry(peer.clone())
            .or_default()
            .clone()
    }

    /// Discard any in-progress handshake with a peer
    ///
    /// The next message for the peer starts from a fresh session; required
    /// after a verification failure before pairing again.
    pub async fn reset_session(&self, peer: &PeerId) {
        self.sessions.write().await.remove(peer);
        debug!(peer = %peer, "handshake session reset");
    }

    /// Derived shared secret for a peer, once stage 3 has run
    pub async fn shared_secret(&self, peer: &PeerId) -> Option<Vec<u8>> {
        match self.sessions.read().await.get(peer) {
            Some(session) => session.lock().await.shared_secret.clone(),
            None => None,
        }
    }

    /// Group key held for a peer, once stage 4 has run
    pub async fn group_key(&self, peer: &PeerId) -> Option<Vec<u8>> {
        match self.sessions.read().await.get(peer) {
            Some(session) => session.lock().await.group_key.clone(),
            None => None,
        }
    }

    /// Save the out-of-band exchange key ahead of an inbound pairing attempt
    ///
    /// The device that renders the QR code generates this key before it
    /// knows which peer will scan it; the key is moved into that peer's
    /// session when its first `publicKeyExchange` message arrives.
    pub async fn save_exchange_key(&self, hex_key: &str) -> Result<(), PairingError> {
        let key = decode_exchange_key(hex_key)?;
        *self.pending_exchange_key.lock().await = Some(key);
        debug!("out-of-band exchange key saved");
        Ok(())
    }

    /// Stage 1, outbound: publish the local long-term public key
    ///
    /// `symmetric_key` (hex) overwrites the session's exchange key when
    /// given; otherwise the session's existing key — or the key saved via
    /// [`save_exchange_key`](Self::save_exchange_key) — is used.
    pub async fn send_public_key_exchange(
        &self,
        to: &PeerId,
        ack: bool,
        symmetric_key: Option<&str>,
    ) -> Result<(), PairingError> {
        let session = self.session(to).await;
        let mut session = session.lock().await;

        if let Some(hex_key) = symmetric_key {
            session.exchange_key = Some(decode_exchange_key(hex_key)?);
        } else if session.exchange_key.is_none() {
            session.exchange_key = self.pending_exchange_key.lock().await.take();
        }
        let exchange_key = session
            .exchange_key
            .clone()
            .ok_or_else(|| PairingError::MissingExchangeKey(to.to_string()))?;

        let device = self.store.current_device().await?;
        let ciphertext = self
            .crypto
            .aead_encrypt(&exchange_key, &device.long_term_public)?;

        let envelope = Envelope::new(
            self.local_id.clone(),
            Some(to.clone()),
            EventKind::PublicKeyExchange,
            ack,
        )
        .with_payload(&EncryptedKeyPayload::new(&ciphertext))?;

        self.channels.publish(to, envelope).await?;
        debug!(peer = %to, ack, "long-term public key sent");
        Ok(())
    }

    /// Stage 1, inbound: decrypt and store the sender's long-term key
    pub async fn handle_public_key_exchange(&self, envelope: Envelope) -> Result<(), PairingError> {
        let sender = envelope.from.clone();
        let payload: EncryptedKeyPayload = envelope.payload()?;

        let session = self.session(&sender).await;
        let mut guard = session.lock().await;

        if guard.exchange_key.is_none() {
            guard.exchange_key = self.pending_exchange_key.lock().await.take();
        }
        let exchange_key = guard
            .exchange_key
            .clone()
            .ok_or_else(|| PairingError::MissingExchangeKey(sender.to_string()))?;

        let long_term_key = self
            .crypto
            .aead_decrypt(&exchange_key, &payload.ciphertext()?)?;
        drop(guard);

        self.store
            .add_paired_device(DeviceRecord {
                peer_id: sender.clone(),
                long_term_public_key: long_term_key.clone(),
                verified: true,
            })
            .await?;

        info!(peer = %sender, "long-term public key received and stored");
        self.events.emit(ClientEvent::LongTermKeyReceived {
            peer: sender.clone(),
            key: long_term_key,
        });

        if !envelope.ack {
            // Initiating message: answer with our own long-term key.
            self.send_public_key_exchange(&sender, true, None).await?;
        }
        Ok(())
    }

    /// Stage 2, outbound: publish a signed ephemeral public key
    pub async fn send_ephemeral_key_exchange(
        &self,
        to: &PeerId,
        ack: bool,
    ) -> Result<(), PairingError> {
        let session = self.session(to).await;
        let mut guard = session.lock().await;

        let ephemeral_public = guard
            .ephemeral
            .get_or_insert_with(|| self.crypto.generate_agreement_keypair())
            .public_key()
            .to_vec();
        drop(guard);

        let device = self.store.current_device().await?;
        let signature = self
            .crypto
            .sign(&device.long_term_private, &ephemeral_public)?;

        let envelope = Envelope::new(
            self.local_id.clone(),
            Some(to.clone()),
            EventKind::EphemeralKeyExchange,
            ack,
        )
        .with_payload(&SignedKeyPayload::new(&ephemeral_public, &signature))?;

        self.channels.publish(to, envelope).await?;
        debug!(peer = %to, ack, "signed ephemeral key sent");
        Ok(())
    }

    /// Stage 2, inbound: verify the sender's ephemeral key and advance
    ///
    /// The signature check against the stored long-term key is the only
    /// thing binding this exchange to the previously-trusted identity; a
    /// mismatch abandons the message without touching the session.
    pub async fn handle_ephemeral_key_exchange(
        &self,
        envelope: Envelope,
    ) -> Result<(), PairingError> {
        let sender = envelope.from.clone();
        let payload: SignedKeyPayload = envelope.payload()?;
        let peer_public = payload.key_bytes()?;
        let signature = payload.signature_bytes()?;

        let devices = self.store.list_devices().await?;
        let record = devices
            .get(&sender)
            .ok_or_else(|| PairingError::UnknownPeerKey(sender.to_string()))?;

        if !self
            .crypto
            .verify(&record.long_term_public_key, &signature, &peer_public)
        {
            warn!(peer = %sender, "ephemeral key signature rejected");
            return Err(PairingError::SignatureVerification(sender.to_string()));
        }

        let session = self.session(&sender).await;
        let mut guard = session.lock().await;

        if envelope.ack {
            // Response: both sides have exchanged keys; finish on ours.
            let secret = self.derive_shared_secret(&sender, &mut guard, &peer_public)?;
            drop(guard);

            self.events.emit(ClientEvent::SharedSecretEstablished {
                peer: sender.clone(),
                key: secret,
            });
            self.send_ready_to_transfer(&sender).await
        } else {
            // Initiating message: mint our keypair, derive, and answer.
            if guard.ephemeral.is_none() {
                guard.ephemeral = Some(self.crypto.generate_agreement_keypair());
            }
            self.derive_shared_secret(&sender, &mut guard, &peer_public)?;
            drop(guard);

            self.send_ephemeral_key_exchange(&sender, true).await
        }
    }

    /// Inbound confirmation that the initiator finished stage 3
    pub async fn handle_ready_to_transfer(&self, envelope: Envelope) -> Result<(), PairingError> {
        let sender = envelope.from;

        let session = self.session(&sender).await;
        let secret = session
            .lock()
            .await
            .shared_secret
            .clone()
            .ok_or_else(|| PairingError::NoSharedSecret(sender.to_string()))?;

        info!(peer = %sender, "pairing confirmed by initiator");
        self.events.emit(ClientEvent::SharedSecretEstablished {
            peer: sender,
            key: secret,
        });
        Ok(())
    }

    /// Stage 3: ECDH against the peer's ephemeral key, HKDF to an AEAD key
    ///
    /// Requires the local ephemeral keypair; idempotent within one pairing
    /// attempt, reset together with the session.
    fn derive_shared_secret(
        &self,
        peer: &PeerId,
        session: &mut HandshakeSession,
        peer_public: &[u8],
    ) -> Result<Vec<u8>, PairingError> {
        let ephemeral = session
            .ephemeral
            .as_ref()
            .ok_or_else(|| PairingError::MissingPrivateKey(peer.to_string()))?;

        let secret = self
            .crypto
            .derive_shared_secret(ephemeral.secret_key(), peer_public)?;
        session.shared_secret = Some(secret.clone());
        debug!(peer = %peer, "shared secret derived");
        Ok(secret)
    }

    /// Stage 4, outbound: distribute a group key under the shared secret
    pub async fn send_group_key(&self, to: &PeerId, group_key: &[u8]) -> Result<(), PairingError> {
        let session = self.session(to).await;
        let guard = session.lock().await;

        let shared_secret = guard
            .shared_secret
            .clone()
            .ok_or_else(|| PairingError::NoSharedSecret(to.to_string()))?;

        let ciphertext = self.crypto.aead_encrypt(&shared_secret, group_key)?;
        drop(guard);

        let envelope = Envelope::new(
            self.local_id.clone(),
            Some(to.clone()),
            EventKind::GroupKeyDistribution,
            false,
        )
        .with_payload(&EncryptedKeyPayload::new(&ciphertext))?;

        self.channels.publish(to, envelope).await?;
        debug!(peer = %to, "group key sent");
        Ok(())
    }

    /// Stage 4, inbound: decrypt and keep the distributed group key
    pub async fn handle_group_key(&self, envelope: Envelope) -> Result<(), PairingError> {
        let sender = envelope.from.clone();
        let payload: EncryptedKeyPayload = envelope.payload()?;

        let session = self.session(&sender).await;
        let mut guard = session.lock().await;

        let shared_secret = guard
            .shared_secret
            .clone()
            .ok_or_else(|| PairingError::NoSharedSecret(sender.to_string()))?;

        let group_key = self
            .crypto
            .aead_decrypt(&shared_secret, &payload.ciphertext()?)?;
        guard.group_key = Some(group_key.clone());
        drop(guard);

        info!(peer = %sender, "group key received");
        self.events.emit(ClientEvent::GroupKeyReceived {
            peer: sender,
            key: group_key,
        });
        Ok(())
    }

    async fn send_ready_to_transfer(&self, to: &PeerId) -> Result<(), PairingError> {
        let envelope = Envelope::new(
            self.local_id.clone(),
            Some(to.clone()),
            EventKind::ReadyToTransfer,
            false,
        );
        self.channels.publish(to, envelope).await?;
        Ok(())
    }
}

fn decode_exchange_key(hex_key: &str) -> Result<Vec<u8>, PairingError> {
    let key = hex::decode(hex_key).map_err(PayloadError::from)?;
    if key.len() != AEAD_KEY_LEN {
        return Err(PairingError::Crypto(CryptoError::InvalidKey(format!(
            "exchange key must be {} bytes, got {}",
            AEAD_KEY_LEN,
            key.len()
        ))));
    }
    Ok(key)
}
