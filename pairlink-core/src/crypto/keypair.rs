//! Ephemeral key-agreement keypair
//!
//! One keypair is minted per pairing attempt and discarded afterwards.
//! The secret half is zeroized on drop and redacted from `Debug` output.

use std::fmt;
use zeroize::Zeroize;

/// An ephemeral elliptic-curve keypair used for key agreement
#[derive(Clone)]
pub struct AgreementKeypair {
    /// Raw public key (32 bytes)
    public: Vec<u8>,
    /// Raw secret key (32 bytes), zeroized on drop
    secret: Vec<u8>,
}

impl AgreementKeypair {
    /// Assemble a keypair from raw key halves
    pub fn from_parts(public: Vec<u8>, secret: Vec<u8>) -> Self {
        Self { public, secret }
    }

    /// Raw public key bytes (the exported wire form)
    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Raw secret key bytes
    pub fn secret_key(&self) -> &[u8] {
        &self.secret
    }
}

impl fmt::Debug for AgreementKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgreementKeypair")
            .field("public", &hex::encode(&self.public))
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Drop for AgreementKeypair {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}
