//! Sealed payload crypto
//!
//! AES-256-GCM with a fresh 96-bit nonce per message. The token format is
//! `base64(nonce || ciphertext || tag)` using the standard alphabet, which
//! is what the agent and the relay exchange in the envelope `data` field.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

use crate::error::{Error, Result};

/// Required key length in bytes (AES-256)
pub const KEY_LENGTH: usize = 32;

/// GCM nonce length in bytes
pub const NONCE_LENGTH: usize = 12;

/// A keyed AEAD instance
///
/// Construction fails for any key that is not exactly [`KEY_LENGTH`] bytes,
/// so a misconfigured key is reported before anything is sealed or opened.
#[derive(Clone)]
pub struct Cipher {
    inner: Aes256Gcm,
}

impl Cipher {
    /// Create a cipher from raw key bytes
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LENGTH {
            return Err(Error::InvalidKeyLength(key.len()));
        }
        let inner =
            Aes256Gcm::new_from_slice(key).map_err(|_| Error::InvalidKeyLength(key.len()))?;
        Ok(Self { inner })
    }

    /// Encrypt `plaintext` under a freshly drawn nonce
    pub fn seal(&self, plaintext: &[u8]) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .inner
            .encrypt(&nonce, plaintext)
            .map_err(|e| Error::internal(format!("Encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    /// Decrypt a token produced by [`Cipher::seal`]
    ///
    /// Bad encoding, truncated input and tag mismatch all return
    /// [`Error::DecryptionFailed`].
    pub fn open(&self, token: &str) -> Result<Vec<u8>> {
        let data = BASE64
            .decode(token.trim())
            .map_err(|_| Error::DecryptionFailed)?;
        if data.len() < NONCE_LENGTH {
            return Err(Error::DecryptionFailed);
        }

        let (nonce, ciphertext) = data.split_at(NONCE_LENGTH);
        self.inner
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::DecryptionFailed)
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").field("key", &"<REDACTED>").finish()
    }
}

/// Seal `plaintext` with `key`
pub fn seal(key: &[u8], plaintext: &[u8]) -> Result<String> {
    Cipher::new(key)?.seal(plaintext)
}

/// Open `token` with `key`
pub fn open(key: &[u8], token: &str) -> Result<Vec<u8>> {
    Cipher::new(key)?.open(token)
}
