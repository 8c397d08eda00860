//! Sealing and opening the identifier payload carried between sites.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::identifier::PersonalIdentifier;
use crate::crypto::{CryptoError, Cryptor};

/// Encrypted envelope, carried as the `TVPAuthResponse` form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffPayload(String);

impl HandoffPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Why a payload yielded no usable identifier.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload could not be decrypted: {0}")]
    Crypto(#[from] CryptoError),

    #[error("payload is not a handoff envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("payload identifier is not a personal code")]
    MissingPrefix,
}

impl DecodeError {
    /// The failure stems from local misconfiguration rather than the input.
    pub fn is_configuration(&self) -> bool {
        matches!(self, DecodeError::Crypto(e) if e.is_configuration())
    }
}

#[derive(Serialize, Deserialize)]
struct HandoffEnvelope {
    identifier: String,
}

pub struct HandoffCodec {
    cryptor: Arc<Cryptor>,
}

impl HandoffCodec {
    pub fn new(cryptor: Arc<Cryptor>) -> Self {
        Self { cryptor }
    }

    /// Seal an identifier for transport to a satellite.
    pub fn encode(&self, identifier: &PersonalIdentifier) -> Result<HandoffPayload, CryptoError> {
        let envelope = HandoffEnvelope {
            identifier: identifier.as_str().to_string(),
        };
        // Serializing a single string field cannot fail.
        let plaintext = serde_json::to_string(&envelope).map_err(|_| CryptoError::Encoding)?;
        Ok(HandoffPayload(self.cryptor.encrypt(&plaintext)?))
    }

    /// Open a payload. Every failure is reported, none is fatal to the caller.
    pub fn decode(&self, payload: &str) -> Result<PersonalIdentifier, DecodeError> {
        let plaintext = self.cryptor.decrypt(payload)?;
        let envelope: HandoffEnvelope = serde_json::from_str(&plaintext)?;

        let identifier =
            PersonalIdentifier::parse(&envelope.identifier).ok_or(DecodeError::MissingPrefix)?;

        debug!("Handoff payload opened");
        Ok(identifier)
    }
}
