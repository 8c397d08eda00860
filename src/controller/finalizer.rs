//! Turns a resolved account into a signed-in session.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::directory::{Account, Directory, SessionFlags, SessionGrant};

pub struct LoginFinalizer {
    directory: Arc<dyn Directory>,
    flags: Arc<dyn SessionFlags>,
}

impl LoginFinalizer {
    pub fn new(directory: Arc<dyn Directory>, flags: Arc<dyn SessionFlags>) -> Self {
        Self { directory, flags }
    }

    /// Sign `account` in and mark the login as delegated. No retries.
    pub fn finalize(&self, account: &Account) -> Result<SessionGrant> {
        let grant = self
            .directory
            .finalize_login(account)
            .context("Failed to create local session")?;

        info!(
            account_id = %account.id,
            "Successfully logged in by latvija.lv by user {}",
            account.display_name
        );

        self.flags
            .set_delegated(&account.id, true)
            .context("Failed to record delegated login")?;

        Ok(grant)
    }
}
