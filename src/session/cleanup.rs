//! Background session cleanup task.
//!
//! Periodically evicts expired sessions from the store.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::store::SessionStore;

/// Default cleanup interval in seconds.
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300; // 5 minutes

/// Spawn a background task that periodically cleans up expired sessions.
///
/// Returns a `JoinHandle` that can be used to abort the task.
pub fn spawn_cleanup_task(
    session_store: Arc<SessionStore>,
    cleanup_interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(cleanup_interval_secs));

        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match session_store.evict_expired() {
                Ok(count) => {
                    if count > 0 {
                        info!(evicted = count, "Session cleanup completed");
                    } else {
                        debug!("Session cleanup: no expired sessions");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Session cleanup failed");
                }
            }

            if let Ok(count) = session_store.session_count() {
                debug!(active_sessions = count, "Session store status");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::LocalSession;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_cleanup_task_keeps_live_sessions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.redb");
        let store = Arc::new(SessionStore::open(path, 3600).unwrap());

        store.create("42").unwrap();
        assert_eq!(store.session_count().unwrap(), 1);

        let handle = spawn_cleanup_task(Arc::clone(&store), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.abort();

        assert_eq!(store.session_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_task_evicts_expired() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.redb");
        let store = Arc::new(SessionStore::open(path, 0).unwrap());

        let session: LocalSession = store.create("42").unwrap();
        assert_eq!(session.account_id, "42");

        let handle = spawn_cleanup_task(Arc::clone(&store), 1);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.abort();

        assert_eq!(store.session_count().unwrap(), 0);
    }
}
