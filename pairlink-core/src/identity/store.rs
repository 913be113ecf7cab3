//! Device store abstraction
//!
//! Durable record of the local device's long-term keys and of paired peers'
//! verified long-term public keys. The pairing engine only sees this trait;
//! hosts plug in whatever persistence they have.

use super::{DeviceRecord, LocalDevice, PeerId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Device store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("device not found: {0}")]
    NotFound(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Durable device and identity storage
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// The local device's long-term key material
    async fn current_device(&self) -> Result<LocalDevice, StoreError>;

    /// Record a peer's long-term public key received during pairing
    async fn add_paired_device(&self, record: DeviceRecord) -> Result<(), StoreError>;

    /// All known paired devices, keyed by peer id
    async fn list_devices(&self) -> Result<HashMap<PeerId, DeviceRecord>, StoreError>;
}

fn lock_poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Backend("lock poisoned: a thread panicked while holding it".to_string())
}

/// In-memory device store (non-persistent, for tests and local development)
pub struct MemoryDeviceStore {
    local: LocalDevice,
    devices: RwLock<HashMap<PeerId, DeviceRecord>>,
}

impl MemoryDeviceStore {
    /// Create a store owning the given local identity
    pub fn new(local: LocalDevice) -> Self {
        Self {
            local,
            devices: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn current_device(&self) -> Result<LocalDevice, StoreError> {
        Ok(self.local.clone())
    }

    async fn add_paired_device(&self, record: DeviceRecord) -> Result<(), StoreError> {
        self.devices
            .write()
            .map_err(lock_poisoned)?
            .insert(record.peer_id.clone(), record);
        Ok(())
    }

    async fn list_devices(&self) -> Result<HashMap<PeerId, DeviceRecord>, StoreError> {
        Ok(self.devices.read().map_err(lock_poisoned)?.clone())
    }
}
