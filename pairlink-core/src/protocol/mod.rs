//! Wire protocol types
//!
//! An [`Envelope`] is the unit of exchange on the relay: sender, receiver,
//! event kind, ack flag, and a JSON payload map. Payload maps decode into the
//! typed structs below per event kind. Envelopes are serialized as JSON.

use crate::identity::PeerId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Protocol message kinds
///
/// Closed enumeration: extending the protocol means adding a case here plus
/// a route in the dispatcher. Kinds sent by newer peers decode as
/// [`EventKind::Unknown`] and are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Liveness probe published after subscribing to a peer's topic
    #[serde(rename = "ping")]
    Ping,
    /// Reply to a probe; reserved, carries no handler logic yet
    #[serde(rename = "pong")]
    Pong,
    /// Long-term public key exchange, encrypted under the out-of-band key
    #[serde(rename = "publicKeyExchange")]
    PublicKeyExchange,
    /// Signed ephemeral public key exchange
    #[serde(rename = "ephemeralKeyExchange")]
    EphemeralKeyExchange,
    /// Initiator's confirmation that the shared secret is established
    #[serde(rename = "readyToTransfer")]
    ReadyToTransfer,
    /// Group key encrypted under the derived shared secret
    #[serde(rename = "groupKeyDistribution")]
    GroupKeyDistribution,
    /// Any kind this build does not know about
    #[serde(other)]
    Unknown,
}

/// Payload decoding errors
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("payload field is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// The unit of exchange between devices
///
/// Published only on a topic the publisher currently holds a subscribed
/// channel for. `ack == false` marks an initiating message, `ack == true`
/// the corresponding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Sending peer
    pub from: PeerId,

    /// Receiving peer; probes omit it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<PeerId>,

    /// Message kind
    pub event: EventKind,

    /// True when this message responds to a previous one
    #[serde(default)]
    pub ack: bool,

    /// Event-specific payload
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl Envelope {
    /// Build an envelope without a payload
    pub fn new(from: PeerId, to: Option<PeerId>, event: EventKind, ack: bool) -> Self {
        Self {
            from,
            to,
            event,
            ack,
            data: Map::new(),
        }
    }

    /// Attach a typed payload, replacing any existing one
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Result<Self, PayloadError> {
        match serde_json::to_value(payload) {
            Ok(Value::Object(map)) => {
                self.data = map;
                Ok(self)
            }
            Ok(other) => Err(PayloadError::Malformed(format!(
                "payload must serialize to an object, got {}",
                other
            ))),
            Err(e) => Err(PayloadError::Malformed(e.to_string())),
        }
    }

    /// Decode the payload map into a typed struct
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        serde_json::from_value(Value::Object(self.data.clone()))
            .map_err(|e| PayloadError::Malformed(e.to_string()))
    }
}

/// Payload of `publicKeyExchange` and `groupKeyDistribution` messages:
/// hex-encoded AEAD ciphertext
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedKeyPayload {
    /// Hex-encoded `nonce || ciphertext`
    pub key: String,
}

impl EncryptedKeyPayload {
    /// Wrap raw ciphertext bytes
    pub fn new(ciphertext: &[u8]) -> Self {
        Self {
            key: hex::encode(ciphertext),
        }
    }

    /// Raw ciphertext bytes
    pub fn ciphertext(&self) -> Result<Vec<u8>, PayloadError> {
        Ok(hex::decode(&self.key)?)
    }
}

/// Payload of `ephemeralKeyExchange` messages: the raw ephemeral public key
/// and a long-term signature over it, both hex-encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedKeyPayload {
    /// Hex-encoded raw ephemeral public key
    pub key: String,
    /// Hex-encoded signature over the raw key bytes
    pub signature: String,
}

impl SignedKeyPayload {
    /// Wrap raw key and signature bytes
    pub fn new(public_key: &[u8], signature: &[u8]) -> Self {
        Self {
            key: hex::encode(public_key),
            signature: hex::encode(signature),
        }
    }

    /// Raw ephemeral public key bytes
    pub fn key_bytes(&self) -> Result<Vec<u8>, PayloadError> {
        Ok(hex::decode(&self.key)?)
    }

    /// Raw signature bytes
    pub fn signature_bytes(&self) -> Result<Vec<u8>, PayloadError> {
        Ok(hex::decode(&self.signature)?)
    }
}
