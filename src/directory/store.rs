//! Account store backed by redb embedded database.
//!
//! Provides persistent storage for local accounts with:
//! - In-memory cache for fast lookups
//! - A hashed-identifier index that may hold several account ids
//! - The delegated-login flag per account

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, warn};

use super::types::{Account, SessionFlags};
use crate::handoff::HashedIdentifier;

/// Primary account table: id -> MessagePack<Account>.
const ACCOUNTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");
/// Secondary index: hashed identifier -> MessagePack<Vec<id>>.
const HASH_INDEX: TableDefinition<&str, &[u8]> = TableDefinition::new("account_hash_index");
/// Delegated-login flags: id -> 0/1.
const FLAGS_TABLE: TableDefinition<&str, u8> = TableDefinition::new("account_flags");

type LoadedCaches = (HashMap<String, Account>, HashMap<String, Vec<String>>);

pub struct AccountStore {
    db: Database,
    /// Primary cache: id -> Account.
    account_cache: RwLock<HashMap<String, Account>>,
    /// Index cache: hashed identifier -> ids.
    hash_cache: RwLock<HashMap<String, Vec<String>>>,
}

impl AccountStore {
    /// Open or create an account store at the given path.
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let db = Database::create(&path)
            .with_context(|| format!("Failed to open account database: {:?}", path))?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ACCOUNTS_TABLE)?;
            let _ = write_txn.open_table(HASH_INDEX)?;
            let _ = write_txn.open_table(FLAGS_TABLE)?;
        }
        write_txn.commit()?;

        let (account_cache, hash_cache) = Self::load_all(&db)?;
        debug!(accounts = account_cache.len(), "Loaded accounts into cache");

        Ok(Self {
            db,
            account_cache: RwLock::new(account_cache),
            hash_cache: RwLock::new(hash_cache),
        })
    }

    /// Store a new account and index it under its hashed identifier.
    pub fn create(&self, account: Account) -> Result<Account> {
        let data = rmp_serde::to_vec_named(&account).context("Failed to serialize account")?;

        let write_txn = self.db.begin_write()?;
        let ids = {
            let mut accounts = write_txn.open_table(ACCOUNTS_TABLE)?;
            let mut index = write_txn.open_table(HASH_INDEX)?;

            if accounts.get(account.id.as_str())?.is_some() {
                anyhow::bail!("account '{}' already exists", account.id);
            }
            accounts.insert(account.id.as_str(), data.as_slice())?;

            // Merge into the existing index entry; a shared hash keeps every id
            let mut ids: Vec<String> = match index.get(account.hashed_identifier.as_str())? {
                Some(value) => rmp_serde::from_slice(value.value())
                    .context("Failed to deserialize account index")?,
                None => Vec::new(),
            };
            ids.push(account.id.clone());
            let encoded = rmp_serde::to_vec(&ids)?;
            index.insert(account.hashed_identifier.as_str(), encoded.as_slice())?;
            ids
        };
        write_txn.commit()?;

        if ids.len() > 1 {
            warn!(
                accounts = ids.len(),
                "Several accounts now share one hashed identifier"
            );
        }

        if let Ok(mut cache) = self.account_cache.write() {
            cache.insert(account.id.clone(), account.clone());
        }
        if let Ok(mut cache) = self.hash_cache.write() {
            cache.insert(account.hashed_identifier.clone(), ids);
        }

        Ok(account)
    }

    pub fn get(&self, id: &str) -> Result<Option<Account>> {
        if let Ok(cache) = self.account_cache.read() {
            if let Some(account) = cache.get(id) {
                return Ok(Some(account.clone()));
            }
        }

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS_TABLE)?;
        let account: Account = match table.get(id)? {
            Some(value) => {
                rmp_serde::from_slice(value.value()).context("Failed to deserialize account")?
            }
            None => return Ok(None),
        };

        if let Ok(mut cache) = self.account_cache.write() {
            cache.insert(account.id.clone(), account.clone());
        }

        Ok(Some(account))
    }

    /// All accounts indexed under `hash`.
    pub fn find_by_hash(&self, hash: &HashedIdentifier) -> Result<Vec<Account>> {
        let cached = self
            .hash_cache
            .read()
            .ok()
            .and_then(|cache| cache.get(hash.as_str()).cloned());

        let ids: Vec<String> = match cached {
            Some(ids) => ids,
            None => {
                let read_txn = self.db.begin_read()?;
                let table = read_txn.open_table(HASH_INDEX)?;
                let ids = match table.get(hash.as_str())? {
                    Some(value) => rmp_serde::from_slice(value.value())
                        .context("Failed to deserialize account index")?,
                    None => return Ok(Vec::new()),
                };
                ids
            }
        };

        let mut accounts = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get(&id)? {
                Some(account) => accounts.push(account),
                None => warn!(account_id = %id, "Index entry points to a missing account"),
            }
        }
        Ok(accounts)
    }

    pub fn count(&self) -> Result<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS_TABLE)?;
        Ok(table.len()? as usize)
    }

    fn load_all(db: &Database) -> Result<LoadedCaches> {
        let mut accounts = HashMap::new();
        let mut index = HashMap::new();

        let read_txn = db.begin_read()?;

        let table = read_txn.open_table(ACCOUNTS_TABLE)?;
        for entry in table.iter()? {
            let (key, value) = entry?;
            match rmp_serde::from_slice::<Account>(value.value()) {
                Ok(account) => {
                    accounts.insert(account.id.clone(), account);
                }
                Err(e) => {
                    warn!(key = key.value(), error = %e, "Failed to deserialize account, skipping");
                }
            }
        }

        let table = read_txn.open_table(HASH_INDEX)?;
        for entry in table.iter()? {
            let (key, value) = entry?;
            if let Ok(ids) = rmp_serde::from_slice::<Vec<String>>(value.value()) {
                index.insert(key.value().to_string(), ids);
            }
        }

        Ok((accounts, index))
    }
}

impl SessionFlags for AccountStore {
    fn is_delegated(&self, account_id: &str) -> Result<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(FLAGS_TABLE)?;
        let delegated = matches!(table.get(account_id)?, Some(v) if v.value() == 1);
        Ok(delegated)
    }

    fn set_delegated(&self, account_id: &str, delegated: bool) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(FLAGS_TABLE)?;
            if delegated {
                table.insert(account_id, 1u8)?;
            } else {
                table.remove(account_id)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}
