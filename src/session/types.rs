//! Local login session types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique session identifier (16-byte random value, hex-encoded in cookies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId([u8; 16]);

impl SessionId {
    pub fn new() -> Self {
        Self(rand::random())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 16] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A signed-in local account on this site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSession {
    pub id: SessionId,

    /// Account the session belongs to.
    pub account_id: String,

    pub created_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,

    /// Updated on each lookup.
    pub last_accessed: DateTime<Utc>,
}

impl LocalSession {
    pub fn new(account_id: impl Into<String>, ttl_secs: u64) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            account_id: account_id.into(),
            created_at: now,
            expires_at: now + chrono::Duration::seconds(ttl_secs as i64),
            last_accessed: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_roundtrip() {
        let id = SessionId::new();
        assert_eq!(SessionId::from_hex(&id.to_hex()), Some(id));
    }

    #[test]
    fn test_session_id_invalid_hex() {
        assert!(SessionId::from_hex("not-valid-hex").is_none());
        assert!(SessionId::from_hex("abcd").is_none()); // too short
        assert!(SessionId::from_hex("").is_none());
    }

    #[test]
    fn test_session_expiry() {
        let mut session = LocalSession::new("7", 3600);
        assert!(!session.is_expired());

        session.expires_at = Utc::now() - chrono::Duration::seconds(10);
        assert!(session.is_expired());
    }
}
