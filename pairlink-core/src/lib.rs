//! Pairlink Core
//!
//! Device pairing and session-key exchange over relayed publish/subscribe
//! channels. Two devices that share nothing but a short-lived out-of-band
//! secret (typically scanned from a QR code) bootstrap mutual trust, derive a
//! fresh shared secret, and distribute a symmetric group key over it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────┐
//! │          Client             │
//! └──┬──────────┬──────────┬───┘
//!    │          │          │
//!    ▼          ▼          ▼
//! Channels   Pairing   Dispatcher
//!    │          │
//!    ▼          ▼
//! Transport  Crypto / Device Store
//! ```

#![warn(clippy::all)]

pub mod channels;
pub mod client;
pub mod config;
pub mod crypto;
pub mod dispatch;
pub mod events;
pub mod identity;
pub mod logging;
pub mod pairing;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
pub use client::{Client, ClientError};
pub use config::Config;
pub use events::ClientEvent;
pub use identity::PeerId;
pub use logging::{init_logging, LogLevel};
