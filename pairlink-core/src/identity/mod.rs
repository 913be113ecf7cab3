//! Device identity types
//!
//! A device is named by an opaque [`PeerId`] string that doubles as its relay
//! topic. Long-term Ed25519 identity key material lives in a [`DeviceStore`];
//! peers whose long-term public key has been received during pairing are
//! recorded as [`DeviceRecord`]s.

use serde::{Deserialize, Serialize};
use std::fmt;

mod store;

pub use store::{DeviceStore, MemoryDeviceStore, StoreError};

/// Opaque unique identifier of a device
///
/// Derived externally (e.g. from a hash of the device's long-term public
/// key). Also used verbatim as the device's relay topic name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    /// Create a peer id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random peer id for hosts that do not supply one
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice (also the relay topic name)
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the identifier carries no characters
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The local device's long-term identity key material
///
/// The raw public encoding is also the serialized form sent to peers during
/// pairing, so a single field covers both.
#[derive(Clone)]
pub struct LocalDevice {
    /// Raw Ed25519 public key (32 bytes)
    pub long_term_public: Vec<u8>,
    /// Raw Ed25519 private key (32 bytes)
    pub long_term_private: Vec<u8>,
}

impl fmt::Debug for LocalDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalDevice")
            .field("long_term_public", &hex::encode(&self.long_term_public))
            .field("long_term_private", &"<redacted>")
            .finish()
    }
}

/// A paired peer's verified long-term public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// The peer this record belongs to
    pub peer_id: PeerId,
    /// Raw Ed25519 public key received during pairing
    pub long_term_public_key: Vec<u8>,
    /// Whether the key arrived through a completed pairing exchange
    pub verified: bool,
}
