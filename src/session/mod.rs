//! Local login sessions.
//!
//! Sessions are persisted in redb, cached in memory and swept by a
//! background task.

pub mod cleanup;
pub mod config;
pub mod store;
pub mod types;

pub use cleanup::{spawn_cleanup_task, DEFAULT_CLEANUP_INTERVAL_SECS};
pub use config::SessionConfig;
pub use store::SessionStore;
pub use types::SessionId;
