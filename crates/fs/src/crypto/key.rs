//! Content encryption using ChaCha20-Poly1305
//!
//! Every private block (node header or userland chunk) is encrypted
//! with its own `Key`. Keys for private nodes are derived from the
//! node's ratchet state; chunk keys reuse the owning node's key. The
//! ciphertext layout is `nonce (12 bytes) || encrypted(hash(32 bytes)
//! || plaintext) || tag (16 bytes)`: a BLAKE3 hash of the plaintext is
//! sealed alongside it so corruption is detected even when the AEAD
//! tag verifies.

use std::ops::Deref;

use chacha20poly1305::Key as ChaChaKey;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use serde::{Deserialize, Serialize};

/// Size of ChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of a symmetric content key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;
/// Size of BLAKE3 hash in bytes (256 bits)
pub const BLAKE3_HASH_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("decryption failed")]
    DecryptionFailed,
}

/// A 256-bit symmetric encryption key
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Key([u8; KEY_SIZE]);

impl Default for Key {
    fn default() -> Self {
        Key([0; KEY_SIZE])
    }
}

impl Deref for Key {
    type Target = [u8; KEY_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; KEY_SIZE]> for Key {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Key(bytes)
    }
}

impl Key {
    /// Generate a new random key using a cryptographically secure RNG
    pub fn generate() -> Self {
        let mut buff = [0; KEY_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        Self(buff)
    }

    /// Create a key from a byte slice
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `KEY_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, KeyError> {
        if data.len() != KEY_SIZE {
            return Err(anyhow::anyhow!(
                "invalid key size, expected {}, got {}",
                KEY_SIZE,
                data.len()
            )
            .into());
        }
        let mut buff = [0; KEY_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    /// Get a reference to the key bytes
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Whether this is the all-zero placeholder key
    pub fn is_empty(&self) -> bool {
        self.0 == [0; KEY_SIZE]
    }

    /// Encrypt data using ChaCha20-Poly1305 AEAD
    ///
    /// The output format is: `nonce (12 bytes) || encrypted(hash(32) ||
    /// plaintext) || auth_tag (16 bytes)`. A random nonce is generated
    /// for each encryption operation.
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, KeyError> {
        let plaintext_hash = blake3::hash(data);

        let mut data_with_hash = Vec::with_capacity(BLAKE3_HASH_SIZE + data.len());
        data_with_hash.extend_from_slice(plaintext_hash.as_bytes());
        data_with_hash.extend_from_slice(data);

        let key = ChaChaKey::from_slice(self.bytes());
        let cipher = ChaCha20Poly1305::new(key);

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce_bytes)
            .map_err(|e| anyhow::anyhow!("failed to generate nonce: {}", e))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, data_with_hash.as_ref())
            .map_err(|_| anyhow::anyhow!("encrypt error"))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(nonce.as_ref());
        out.extend_from_slice(ciphertext.as_ref());

        Ok(out)
    }

    /// Decrypt data using ChaCha20-Poly1305 AEAD
    ///
    /// Returns only the plaintext; the sealed hash is stripped after
    /// verification.
    ///
    /// # Errors
    ///
    /// Returns `DecryptionFailed` if the data is too short, the
    /// authentication tag does not verify (wrong key or tampering), or
    /// the sealed hash does not match the plaintext.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, KeyError> {
        if data.len() < NONCE_SIZE {
            return Err(KeyError::DecryptionFailed);
        }

        let key = ChaChaKey::from_slice(self.bytes());
        let nonce = Nonce::from_slice(&data[..NONCE_SIZE]);
        let cipher = ChaCha20Poly1305::new(key);
        let decrypted = cipher
            .decrypt(nonce, &data[NONCE_SIZE..])
            .map_err(|_| KeyError::DecryptionFailed)?;

        if decrypted.len() < BLAKE3_HASH_SIZE {
            return Err(KeyError::DecryptionFailed);
        }

        let stored_hash = &decrypted[..BLAKE3_HASH_SIZE];
        let plaintext = &decrypted[BLAKE3_HASH_SIZE..];

        let computed_hash = blake3::hash(plaintext);
        if stored_hash != computed_hash.as_bytes() {
            return Err(KeyError::DecryptionFailed);
        }

        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_encrypt_decrypt() {
        let key = Key::generate();
        let data = b"hello world, this is a test message for encryption";

        let encrypted = key.encrypt(data).unwrap();
        let decrypted = key.decrypt(&encrypted).unwrap();

        assert_eq!(data.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_key_size_validation() {
        let too_short = [1u8; 16];
        let too_long = [1u8; 64];

        assert!(Key::from_slice(&too_short).is_err());
        assert!(Key::from_slice(&too_long).is_err());

        let just_right = [1u8; KEY_SIZE];
        assert!(Key::from_slice(&just_right).is_ok());
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = Key::generate();
        let other = Key::generate();
        let encrypted = key.encrypt(b"secret").unwrap();

        assert!(matches!(
            other.decrypt(&encrypted),
            Err(KeyError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = Key::generate();
        let mut encrypted = key.encrypt(b"test data for integrity check").unwrap();

        if encrypted.len() > NONCE_SIZE + 16 {
            encrypted[NONCE_SIZE + 10] ^= 0xFF;
            assert!(key.decrypt(&encrypted).is_err());
        }
    }

    #[test]
    fn test_empty_data_encryption() {
        let key = Key::generate();
        let encrypted = key.encrypt(b"").unwrap();
        let decrypted = key.decrypt(&encrypted).unwrap();

        assert!(decrypted.is_empty());
    }
}
