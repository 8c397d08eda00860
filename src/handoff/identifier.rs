//! Personal identifiers and their lookup hashes.

use std::fmt;

/// Marker that every valid personal code asserted by the IdP starts with.
pub const PERSONAL_CODE_PREFIX: &str = "PK:";

/// A personal identifier as asserted by the IdP, e.g. `PK:123456-78901`.
#[derive(Clone, PartialEq, Eq)]
pub struct PersonalIdentifier(String);

impl PersonalIdentifier {
    /// Accept `raw` only when non-empty and carrying the personal code prefix.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() <= PERSONAL_CODE_PREFIX.len() || !raw.starts_with(PERSONAL_CODE_PREFIX) {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The code without its prefix; this is what lookup hashes are built from.
    pub fn personal_code(&self) -> &str {
        &self.0[PERSONAL_CODE_PREFIX.len()..]
    }
}

// Personal codes are PII and stay out of logs.
impl fmt::Debug for PersonalIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PersonalIdentifier({}***)", PERSONAL_CODE_PREFIX)
    }
}

/// Keyed hash of a personal code, the key stored on directory accounts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashedIdentifier(String);

impl HashedIdentifier {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HashedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requires_prefix() {
        let id = PersonalIdentifier::parse("PK:123456-78901").unwrap();
        assert_eq!(id.as_str(), "PK:123456-78901");
        assert_eq!(id.personal_code(), "123456-78901");

        assert!(PersonalIdentifier::parse("").is_none());
        assert!(PersonalIdentifier::parse("PK:").is_none());
        assert!(PersonalIdentifier::parse("123456-78901").is_none());
        assert!(PersonalIdentifier::parse("pk:123456-78901").is_none());
        assert!(PersonalIdentifier::parse("XX:123456-78901").is_none());
    }

    #[test]
    fn test_debug_redacts_code() {
        let id = PersonalIdentifier::parse("PK:123456-78901").unwrap();
        assert!(!format!("{:?}", id).contains("123456"));
    }
}
