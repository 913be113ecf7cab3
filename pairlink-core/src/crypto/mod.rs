//! Cryptographic provider abstraction
//!
//! The pairing engine consumes all cryptography through the object-safe
//! [`CryptoProvider`] trait: symmetric AEAD, ephemeral elliptic-curve key
//! agreement, and long-term asymmetric signatures. Key material crosses this
//! boundary as raw byte slices; hex encoding happens at the wire layer.
//!
//! [`StandardCrypto`] is the default implementation: X25519 for agreement,
//! Ed25519 for signatures, AES-256-GCM for AEAD, HKDF-SHA256 for deriving
//! the shared secret.

use thiserror::Error;

mod keypair;
mod standard;

pub use keypair::AgreementKeypair;
pub use standard::{generate_signing_keypair, StandardCrypto};

/// Length in bytes of symmetric keys accepted by the AEAD operations
pub const AEAD_KEY_LEN: usize = 32;

/// Cryptographic operation errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD encryption failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// AEAD decryption or authentication failed
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// A key had the wrong length or encoding
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// Producing a signature failed
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Cryptographic operations consumed by the pairing engine
///
/// Implementations must be deterministic given their inputs apart from
/// nonce/keypair generation, and must never panic on malformed peer input.
pub trait CryptoProvider: Send + Sync {
    /// Authenticated encryption; the returned ciphertext embeds the nonce
    fn aead_encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Authenticated decryption of [`aead_encrypt`](Self::aead_encrypt) output
    fn aead_decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Generate a fresh ephemeral key-agreement keypair
    fn generate_agreement_keypair(&self) -> AgreementKeypair;

    /// Diffie-Hellman over the agreement curve followed by HKDF, producing
    /// an [`AEAD_KEY_LEN`]-byte symmetric key
    fn derive_shared_secret(
        &self,
        private_key: &[u8],
        peer_public_key: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Sign a message with a long-term private key
    fn sign(&self, private_key: &[u8], message: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Verify a signature against a long-term public key
    ///
    /// Malformed keys or signatures verify as `false`, never as an error.
    fn verify(&self, public_key: &[u8], signature: &[u8], message: &[u8]) -> bool;
}
