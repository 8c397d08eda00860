//! Authenticated encryption, lookup hashing and day-token derivation.
//!
//! The key is loaded from its [`KeySource`] on every operation, so a key
//! written to a key file takes effect on the next request.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Key, XChaCha20Poly1305, XNonce,
};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use zeroize::Zeroizing;

use super::clock::Clock;
use super::error::CryptoError;
use crate::settings::KeySource;

type HmacSha256 = Hmac<Sha256>;

/// Length of the symmetric key in bytes.
pub const KEY_LEN: usize = 32;

/// XChaCha20 nonce length in bytes.
const NONCE_LEN: usize = 24;

/// Poly1305 tag length in bytes.
const TAG_LEN: usize = 16;

/// Date format mixed into day tokens.
const DAY_FORMAT: &str = "%Y.%m.%d";

pub struct Cryptor {
    key: KeySource,
    hash_salt: Zeroizing<String>,
    clock: Arc<dyn Clock>,
}

impl Cryptor {
    pub fn new(key: KeySource, hash_salt: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            key,
            hash_salt: Zeroizing::new(hash_salt.into()),
            clock,
        }
    }

    /// Generate a fresh hex-encoded key.
    pub fn generate_key() -> String {
        let key = Zeroizing::new(rand::random::<[u8; KEY_LEN]>());
        hex::encode(key.as_slice())
    }

    fn load_key(&self) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
        let text = self
            .key
            .read()
            .map_err(|e| CryptoError::KeyUnavailable(e.to_string()))?;

        let bytes = Zeroizing::new(hex::decode(text.as_str()).map_err(|_| CryptoError::InvalidKey)?);
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey);
        }

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&bytes);
        Ok(key)
    }

    /// Encrypt `plaintext`. Output is hex(nonce || ciphertext || tag).
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let key = self.load_key()?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_slice()));
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::InvalidKey)?;

        let mut out = nonce.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(hex::encode(out))
    }

    /// Decrypt output of [`Cryptor::encrypt`].
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let key = self.load_key()?;

        let raw = hex::decode(ciphertext.trim()).map_err(|_| CryptoError::Decryption)?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Decryption);
        }

        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_slice()));
        let plaintext = cipher
            .decrypt(XNonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::Encoding)
    }

    /// Keyed lookup hash: HMAC-SHA256 over the salt, URL-safe base64.
    pub fn hash(&self, text: &str) -> Result<String, CryptoError> {
        let mut mac = <HmacSha256 as KeyInit>::new_from_slice(self.hash_salt.as_bytes())
            .map_err(|_| CryptoError::InvalidKey)?;
        mac.update(text.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    /// Token authorizing a redirect to or from `host` for the current day.
    pub fn day_token(&self, host: &str) -> Result<String, CryptoError> {
        let secret = self
            .key
            .read()
            .map_err(|e| CryptoError::KeyUnavailable(e.to_string()))?;
        let day = self.clock.today().format(DAY_FORMAT).to_string();

        let mut hasher = Sha256::new();
        hasher.update(host.as_bytes());
        hasher.update(secret.as_bytes());
        hasher.update(day.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}
