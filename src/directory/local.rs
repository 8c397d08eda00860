//! Directory over the local account and session stores.

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use super::store::AccountStore;
use super::types::{Account, CurrentUser, Directory, SessionGrant};
use crate::handoff::HashedIdentifier;
use crate::session::SessionStore;

pub struct LocalDirectory {
    accounts: Arc<AccountStore>,
    sessions: Arc<SessionStore>,
}

impl LocalDirectory {
    pub fn new(accounts: Arc<AccountStore>, sessions: Arc<SessionStore>) -> Self {
        Self { accounts, sessions }
    }
}

impl Directory for LocalDirectory {
    fn find_by_hashed_identifier(&self, hash: &HashedIdentifier) -> Result<Vec<Account>> {
        self.accounts.find_by_hash(hash)
    }

    fn finalize_login(&self, account: &Account) -> Result<SessionGrant> {
        let session = self.sessions.create(&account.id)?;
        debug!(account_id = %account.id, session = %session.id, "Local session created");

        Ok(SessionGrant {
            session_id: session.id,
            expires_at: session.expires_at,
        })
    }

    fn logout(&self, user: &CurrentUser) -> Result<()> {
        match user.session_id {
            Some(id) => {
                self.sessions.delete(id)?;
            }
            None => {
                self.sessions.delete_by_account(&user.account_id)?;
            }
        }
        Ok(())
    }
}
