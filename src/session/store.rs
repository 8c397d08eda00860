//! Local session store backed by redb.
//!
//! Sessions are MessagePack-encoded and mirrored in an in-memory cache.

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, warn};

use super::types::{LocalSession, SessionId};

/// key: session_id hex, value: MessagePack bytes.
const SESSIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("local_sessions");

pub struct SessionStore {
    db: Database,
    cache: RwLock<HashMap<SessionId, LocalSession>>,
    ttl_secs: u64,
    max_cache_size: usize,
}

impl SessionStore {
    /// Open or create a session store at the given path.
    pub fn open(path: PathBuf, ttl_secs: u64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let db = Database::create(&path)
            .with_context(|| format!("Failed to open session database: {:?}", path))?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SESSIONS_TABLE)?;
        }
        write_txn.commit()?;

        let cache = Self::load_active_sessions(&db)?;
        debug!(sessions = cache.len(), "Loaded active sessions into cache");

        Ok(Self {
            db,
            cache: RwLock::new(cache),
            ttl_secs,
            max_cache_size: 10000,
        })
    }

    /// Start a session for `account_id` with the configured TTL.
    pub fn create(&self, account_id: &str) -> Result<LocalSession> {
        let session = LocalSession::new(account_id, self.ttl_secs);
        self.insert(session.clone())?;
        Ok(session)
    }

    fn insert(&self, session: LocalSession) -> Result<()> {
        self.persist(&session)?;

        if let Ok(mut cache) = self.cache.write() {
            if cache.len() >= self.max_cache_size {
                Self::evict_cache_lru(&mut cache);
            }
            cache.insert(session.id, session);
        }
        Ok(())
    }

    /// Get a live session by ID, updating its last access time.
    pub fn get(&self, id: SessionId) -> Result<Option<LocalSession>> {
        // Check cache first
        if let Ok(mut cache) = self.cache.write() {
            if let Some(session) = cache.get_mut(&id) {
                if session.is_expired() {
                    cache.remove(&id);
                    return Ok(None);
                }
                session.touch();
                let _ = self.persist(session);
                return Ok(Some(session.clone()));
            }
        }

        // Fall back to disk
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SESSIONS_TABLE)?;

        let key = id.to_hex();
        let Some(value) = table.get(key.as_str())? else {
            return Ok(None);
        };

        let mut session: LocalSession =
            rmp_serde::from_slice(value.value()).context("Failed to deserialize session")?;
        if session.is_expired() {
            return Ok(None);
        }
        session.touch();

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(id, session.clone());
        }

        // Persist updated last_accessed once the read transaction is gone
        drop(value);
        drop(table);
        drop(read_txn);
        let _ = self.persist(&session);

        Ok(Some(session))
    }

    pub fn delete(&self, id: SessionId) -> Result<bool> {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(&id);
        }

        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(SESSIONS_TABLE)?;
            let key = id.to_hex();
            let result = table.remove(key.as_str())?;
            result.is_some()
        };
        write_txn.commit()?;

        Ok(removed)
    }

    /// Delete every session of an account.
    pub fn delete_by_account(&self, account_id: &str) -> Result<usize> {
        let ids: Vec<SessionId> = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(SESSIONS_TABLE)?;

            let mut ids = Vec::new();
            for entry in table.iter()? {
                let (_, value) = entry?;
                let session: LocalSession = rmp_serde::from_slice(value.value())?;
                if session.account_id == account_id {
                    ids.push(session.id);
                }
            }
            ids
        };

        let mut deleted = 0;
        for id in ids {
            if self.delete(id)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Evict all expired sessions. Returns the number removed from disk.
    pub fn evict_expired(&self) -> Result<usize> {
        if let Ok(mut cache) = self.cache.write() {
            cache.retain(|_, session| !session.is_expired());
        }

        let expired: Vec<String> = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(SESSIONS_TABLE)?;

            let mut ids = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                match rmp_serde::from_slice::<LocalSession>(value.value()) {
                    Ok(session) if session.is_expired() => {
                        ids.push(key.value().to_string());
                    }
                    Err(e) => {
                        warn!(key = key.value(), error = %e, "Failed to deserialize session, marking for deletion");
                        ids.push(key.value().to_string());
                    }
                    _ => {}
                }
            }
            ids
        };

        if expired.is_empty() {
            return Ok(0);
        }

        let mut evicted = 0;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSIONS_TABLE)?;
            for id in &expired {
                if table.remove(id.as_str())?.is_some() {
                    evicted += 1;
                }
            }
        }
        write_txn.commit()?;

        Ok(evicted)
    }

    pub fn session_count(&self) -> Result<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SESSIONS_TABLE)?;
        Ok(table.len()? as usize)
    }

    fn persist(&self, session: &LocalSession) -> Result<()> {
        let data = rmp_serde::to_vec(session).context("Failed to serialize session")?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSIONS_TABLE)?;
            table.insert(session.id.to_hex().as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn load_active_sessions(db: &Database) -> Result<HashMap<SessionId, LocalSession>> {
        let mut sessions = HashMap::new();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(SESSIONS_TABLE)?;

        for entry in table.iter()? {
            let (_, value) = entry?;
            if let Ok(session) = rmp_serde::from_slice::<LocalSession>(value.value()) {
                if !session.is_expired() {
                    sessions.insert(session.id, session);
                }
            }
        }

        Ok(sessions)
    }

    fn evict_cache_lru(cache: &mut HashMap<SessionId, LocalSession>) {
        if let Some(oldest_id) = cache
            .iter()
            .min_by_key(|(_, s)| s.last_accessed)
            .map(|(id, _)| *id)
        {
            cache.remove(&oldest_id);
        }
    }
}
