//! Fakes for controller tests.

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::endpoint::HandoffContext;
use crate::crypto::{Cryptor, FixedClock};
use crate::directory::{Account, CurrentUser, Directory, SessionFlags, SessionGrant};
use crate::handoff::{DayTokenAuthenticator, HandoffCodec, HashedIdentifier};
use crate::saml::{ProcessedResponse, SamlClient, SloMessage, SloResult};
use crate::session::SessionId;
use crate::settings::{HandoffSettings, KeySource, ModuleConfig, SettingsHandle};

pub const AUTH_HOST: &str = "auth.example.lv";
pub const SITE_HOST: &str = "site.example.lv";

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

pub fn settings(site_host: &str) -> HandoffSettings {
    HandoffSettings {
        site_host: site_host.to_string(),
        auth_path: AUTH_HOST.to_string(),
        idp_saml_path: "https://idp.example.lv/sso".to_string(),
        crypt_key: KeySource::Inline("11".repeat(32)),
        hash_salt: "salt".to_string(),
        ..Default::default()
    }
}

pub fn context(site: HandoffSettings, module: ModuleConfig, clock: Arc<FixedClock>) -> HandoffContext {
    let cryptor = Arc::new(Cryptor::new(
        site.crypt_key.clone(),
        site.hash_salt.clone(),
        clock,
    ));
    HandoffContext {
        settings: SettingsHandle::new(site, module),
        cryptor: cryptor.clone(),
        codec: Arc::new(HandoffCodec::new(cryptor.clone())),
        tokens: Arc::new(DayTokenAuthenticator::new(cryptor)),
    }
}

pub fn account(id: &str, hash: &str) -> Account {
    Account {
        id: id.to_string(),
        display_name: format!("User {}", id),
        hashed_identifier: hash.to_string(),
        created_at: Utc::now(),
    }
}

pub fn user(id: &str) -> CurrentUser {
    CurrentUser {
        account_id: id.to_string(),
        session_id: None,
    }
}

#[derive(Default)]
pub struct FakeSaml {
    pub response: Mutex<ProcessedResponse>,
    pub slo: Mutex<SloResult>,
    pub debug: bool,
    pub logins: Mutex<Vec<String>>,
    pub logouts: Mutex<Vec<String>>,
    pub processed: Mutex<Vec<String>>,
}

impl FakeSaml {
    pub fn answering(response: ProcessedResponse) -> Self {
        Self {
            response: Mutex::new(response),
            ..Default::default()
        }
    }

    pub fn processed_count(&self) -> usize {
        self.processed.lock().unwrap().len()
    }
}

impl SamlClient for FakeSaml {
    fn login(&self, return_to: &str) -> Result<String> {
        self.logins.lock().unwrap().push(return_to.to_string());
        Ok(format!(
            "https://idp.example.lv/sso?SAMLRequest=x&RelayState={}",
            urlencoding::encode(return_to)
        ))
    }

    fn process_response(&self, saml_response: &str) -> ProcessedResponse {
        self.processed.lock().unwrap().push(saml_response.to_string());
        self.response.lock().unwrap().clone()
    }

    fn process_slo(&self, _message: &SloMessage) -> SloResult {
        self.slo.lock().unwrap().clone()
    }

    fn logout(&self, return_to: &str) -> Result<String> {
        self.logouts.lock().unwrap().push(return_to.to_string());
        Ok(format!(
            "https://idp.example.lv/sso?SAMLRequest=y&RelayState={}",
            urlencoding::encode(return_to)
        ))
    }

    fn is_debug_active(&self) -> bool {
        self.debug
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    accounts: Mutex<Vec<Account>>,
    lookups: Mutex<Vec<String>>,
    finalized: Mutex<Vec<String>>,
    grants: Mutex<Vec<SessionGrant>>,
    logouts: Mutex<Vec<CurrentUser>>,
    fail_login: bool,
}

impl FakeDirectory {
    pub fn failing() -> Self {
        Self {
            fail_login: true,
            ..Default::default()
        }
    }

    pub fn add(&self, account: Account) {
        self.accounts.lock().unwrap().push(account);
    }

    /// Hashes the directory was queried with.
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }

    pub fn finalized(&self) -> Vec<String> {
        self.finalized.lock().unwrap().clone()
    }

    pub fn last_grant(&self) -> Option<SessionGrant> {
        self.grants.lock().unwrap().last().cloned()
    }

    pub fn logouts(&self) -> Vec<CurrentUser> {
        self.logouts.lock().unwrap().clone()
    }
}

impl Directory for FakeDirectory {
    fn find_by_hashed_identifier(&self, hash: &HashedIdentifier) -> Result<Vec<Account>> {
        self.lookups.lock().unwrap().push(hash.as_str().to_string());
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.hashed_identifier == hash.as_str())
            .cloned()
            .collect())
    }

    fn finalize_login(&self, account: &Account) -> Result<SessionGrant> {
        if self.fail_login {
            return Err(anyhow!("directory unavailable"));
        }
        self.finalized.lock().unwrap().push(account.id.clone());
        let grant = SessionGrant {
            session_id: SessionId::new(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        };
        self.grants.lock().unwrap().push(grant.clone());
        Ok(grant)
    }

    fn logout(&self, user: &CurrentUser) -> Result<()> {
        self.logouts.lock().unwrap().push(user.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeFlags {
    flags: Mutex<HashMap<String, bool>>,
}

impl SessionFlags for FakeFlags {
    fn is_delegated(&self, account_id: &str) -> Result<bool> {
        Ok(self
            .flags
            .lock()
            .unwrap()
            .get(account_id)
            .copied()
            .unwrap_or(false))
    }

    fn set_delegated(&self, account_id: &str, delegated: bool) -> Result<()> {
        self.flags
            .lock()
            .unwrap()
            .insert(account_id.to_string(), delegated);
        Ok(())
    }
}
