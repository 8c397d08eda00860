//! Day tokens authorizing cross-site redirects.
//!
//! A token is derived from the target host, the shared secret and the
//! calendar day. There is no nonce: anyone holding the secret can mint the
//! token for a host, and an intercepted token replays until the day ends.
//! Derivation sits behind [`TokenAuthority`] so a stronger scheme can
//! replace it without touching the controllers.

use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::error;

use crate::crypto::{CryptoError, Cryptor};

/// Issues and checks cross-site authorization tokens.
pub trait TokenAuthority: Send + Sync {
    /// Token for redirects concerning `host`.
    fn issue(&self, host: &str) -> Result<String, CryptoError>;

    /// Whether `presented` is the token for `host` right now.
    fn verify(&self, host: &str, presented: &str) -> bool;
}

pub struct DayTokenAuthenticator {
    cryptor: Arc<Cryptor>,
}

impl DayTokenAuthenticator {
    pub fn new(cryptor: Arc<Cryptor>) -> Self {
        Self { cryptor }
    }
}

impl TokenAuthority for DayTokenAuthenticator {
    fn issue(&self, host: &str) -> Result<String, CryptoError> {
        self.cryptor.day_token(host)
    }

    fn verify(&self, host: &str, presented: &str) -> bool {
        let expected = match self.cryptor.day_token(host) {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "Cannot derive day token");
                return false;
            }
        };

        let (expected, presented) = (expected.as_bytes(), presented.as_bytes());
        expected.len() == presented.len() && bool::from(expected.ct_eq(presented))
    }
}
