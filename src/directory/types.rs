//! Account directory types and collaborator traits.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::handoff::HashedIdentifier;
use crate::session::SessionId;

/// A local user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub display_name: String,
    /// Keyed hash of the personal code, without its prefix.
    pub hashed_identifier: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(display_name: impl Into<String>, hashed_identifier: &HashedIdentifier) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            display_name: display_name.into(),
            hashed_identifier: hashed_identifier.as_str().to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Session issued when a login is finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    pub session_id: SessionId,
    pub expires_at: DateTime<Utc>,
}

/// The signed-in user of the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub account_id: String,
    pub session_id: Option<SessionId>,
}

/// Account lookup and session creation.
pub trait Directory: Send + Sync {
    /// All accounts stored under `hash`. More than one entry is ambiguous.
    fn find_by_hashed_identifier(&self, hash: &HashedIdentifier) -> Result<Vec<Account>>;

    /// Sign `account` in on this site.
    fn finalize_login(&self, account: &Account) -> Result<SessionGrant>;

    /// End the local session of `user`.
    fn logout(&self, user: &CurrentUser) -> Result<()>;
}

/// Per-account marker of a login that came through the delegated flow.
pub trait SessionFlags: Send + Sync {
    fn is_delegated(&self, account_id: &str) -> Result<bool>;

    fn set_delegated(&self, account_id: &str, delegated: bool) -> Result<()>;
}
