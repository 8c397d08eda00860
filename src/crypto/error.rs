//! Cryptor error types.

use thiserror::Error;

/// Errors raised by [`super::Cryptor`].
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The configured key could not be read.
    #[error("encryption key unavailable: {0}")]
    KeyUnavailable(String),

    /// The configured key is not a hex-encoded 32-byte key.
    #[error("encryption key is malformed")]
    InvalidKey,

    /// Wrong key or modified ciphertext.
    #[error("wrong key or modified ciphertext")]
    Decryption,

    /// Decrypted bytes are not valid UTF-8.
    #[error("plaintext is not valid UTF-8")]
    Encoding,
}

impl CryptoError {
    /// Misconfiguration, as opposed to a bad input.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CryptoError::KeyUnavailable(_) | CryptoError::InvalidKey)
    }
}
