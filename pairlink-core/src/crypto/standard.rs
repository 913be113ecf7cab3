//! Default crypto provider
//!
//! X25519 for ephemeral key agreement, Ed25519 for long-term signatures,
//! AES-256-GCM for AEAD, HKDF-SHA256 for turning the raw Diffie-Hellman
//! output into a symmetric key. Ciphertexts are laid out as
//! `nonce (12 bytes) || ciphertext+tag`.

use super::{AgreementKeypair, CryptoError, CryptoProvider, AEAD_KEY_LEN};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

const NONCE_LEN: usize = 12;
const HKDF_INFO: &[u8] = b"pairlink shared secret v1";

/// Default [`CryptoProvider`] implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardCrypto;

impl StandardCrypto {
    /// Create a provider instance
    pub fn new() -> Self {
        Self
    }
}

/// Generate a long-term Ed25519 signing keypair as `(public, private)` raw
/// bytes. Hosts use this to mint a device identity before first start.
pub fn generate_signing_keypair() -> (Vec<u8>, Vec<u8>) {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    let signing_key = SigningKey::from_bytes(&seed);
    let verifying_key = signing_key.verifying_key();
    (
        verifying_key.to_bytes().to_vec(),
        signing_key.to_bytes().to_vec(),
    )
}

fn aead_key(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    if key.len() != AEAD_KEY_LEN {
        return Err(CryptoError::InvalidKey(format!(
            "AEAD key must be {} bytes, got {}",
            AEAD_KEY_LEN,
            key.len()
        )));
    }
    Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(format!("AEAD key rejected: {}", e)))
}

fn fixed_32(bytes: &[u8], what: &str) -> Result<[u8; 32], CryptoError> {
    bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!("{} must be 32 bytes, got {}", what, bytes.len()))
    })
}

impl CryptoProvider for StandardCrypto {
    fn aead_encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = aead_key(key)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn aead_decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = aead_key(key)?;

        if ciphertext.len() <= NONCE_LEN {
            return Err(CryptoError::Decryption(
                "ciphertext shorter than nonce".to_string(),
            ));
        }
        let (nonce_bytes, body) = ciphertext.split_at(NONCE_LEN);

        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), body)
            .map_err(|e| CryptoError::Decryption(e.to_string()))
    }

    fn generate_agreement_keypair(&self) -> AgreementKeypair {
        let mut secret_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut secret_bytes);

        let secret = StaticSecret::from(secret_bytes);
        let public = X25519PublicKey::from(&secret);

        AgreementKeypair::from_parts(public.to_bytes().to_vec(), secret.to_bytes().to_vec())
    }

    fn derive_shared_secret(
        &self,
        private_key: &[u8],
        peer_public_key: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let secret = StaticSecret::from(fixed_32(private_key, "X25519 private key")?);
        let public = X25519PublicKey::from(fixed_32(peer_public_key, "X25519 public key")?);

        let shared = secret.diffie_hellman(&public);

        let hkdf = Hkdf::<Sha256>::new(None, shared.as_bytes());
        let mut okm = vec![0u8; AEAD_KEY_LEN];
        hkdf.expand(HKDF_INFO, &mut okm)
            .map_err(|e| CryptoError::InvalidKey(format!("HKDF expand failed: {}", e)))?;
        Ok(okm)
    }

    fn sign(&self, private_key: &[u8], message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signing_key = SigningKey::from_bytes(&fixed_32(private_key, "Ed25519 private key")?);
        Ok(signing_key.sign(message).to_bytes().to_vec())
    }

    fn verify(&self, public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
        let Ok(key_bytes) = <&[u8; 32]>::try_from(public_key) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(key_bytes) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        verifying_key.verify(message, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aead_round_trip() {
        let crypto = StandardCrypto::new();
        let key = [9u8; AEAD_KEY_LEN];

        let ciphertext = crypto.aead_encrypt(&key, b"attack at dawn").unwrap();
        assert_ne!(&ciphertext[NONCE_LEN..], b"attack at dawn".as_slice());

        let plaintext = crypto.aead_decrypt(&key, &ciphertext).unwrap();
        assert_eq!(plaintext, b"attack at dawn");
    }

    #[test]
    fn test_aead_rejects_wrong_key() {
        let crypto = StandardCrypto::new();
        let ciphertext = crypto.aead_encrypt(&[1u8; 32], b"payload").unwrap();

        let err = crypto.aead_decrypt(&[2u8; 32], &ciphertext).unwrap_err();
        assert!(matches!(err, CryptoError::Decryption(_)));
    }

    #[test]
    fn test_aead_rejects_short_key() {
        let crypto = StandardCrypto::new();
        let err = crypto.aead_encrypt(&[1u8; 16], b"payload").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey(_)));
    }

    #[test]
    fn test_aead_rejects_truncated_ciphertext() {
        let crypto = StandardCrypto::new();
        let err = crypto.aead_decrypt(&[1u8; 32], &[0u8; 8]).unwrap_err();
        assert!(matches!(err, CryptoError::Decryption(_)));
    }

    #[test]
    fn test_shared_secret_agrees_on_both_sides() {
        let crypto = StandardCrypto::new();
        let alice = crypto.generate_agreement_keypair();
        let bob = crypto.generate_agreement_keypair();

        let alice_secret = crypto
            .derive_shared_secret(alice.secret_key(), bob.public_key())
            .unwrap();
        let bob_secret = crypto
            .derive_shared_secret(bob.secret_key(), alice.public_key())
            .unwrap();

        assert_eq!(alice_secret, bob_secret);
        assert_eq!(alice_secret.len(), AEAD_KEY_LEN);
    }

    #[test]
    fn test_distinct_keypairs_derive_distinct_secrets() {
        let crypto = StandardCrypto::new();
        let alice = crypto.generate_agreement_keypair();
        let bob = crypto.generate_agreement_keypair();
        let carol = crypto.generate_agreement_keypair();

        let with_bob = crypto
            .derive_shared_secret(alice.secret_key(), bob.public_key())
            .unwrap();
        let with_carol = crypto
            .derive_shared_secret(alice.secret_key(), carol.public_key())
            .unwrap();

        assert_ne!(with_bob, with_carol);
    }

    #[test]
    fn test_sign_and_verify() {
        let crypto = StandardCrypto::new();
        let (public, private) = generate_signing_keypair();

        let signature = crypto.sign(&private, b"ephemeral key bytes").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(crypto.verify(&public, &signature, b"ephemeral key bytes"));
        assert!(!crypto.verify(&public, &signature, b"different message"));
    }

    #[test]
    fn test_verify_rejects_malformed_input() {
        let crypto = StandardCrypto::new();
        let (public, private) = generate_signing_keypair();
        let signature = crypto.sign(&private, b"msg").unwrap();

        assert!(!crypto.verify(&[0u8; 7], &signature, b"msg"));
        assert!(!crypto.verify(&public, &[0u8; 3], b"msg"));
    }

    #[test]
    fn test_hex_round_trip_of_key_material() {
        let crypto = StandardCrypto::new();
        let kp = crypto.generate_agreement_keypair();

        let encoded = hex::encode(kp.public_key());
        let decoded = hex::decode(&encoded).unwrap();
        assert_eq!(decoded, kp.public_key());
    }

    #[test]
    fn test_hex_round_trip_of_arbitrary_bytes() {
        for bytes in [
            Vec::new(),
            vec![0u8],
            vec![0xff; 33],
            (0u8..=255).collect::<Vec<u8>>(),
        ] {
            assert_eq!(hex::decode(hex::encode(&bytes)).unwrap(), bytes);
        }
    }
}
