//! Shared state of the HTTP handlers.

use axum::http::{header, HeaderMap};
use std::sync::Arc;
use tracing::warn;

use crate::controller::DelegatedAuthEndpoint;
use crate::directory::{AccountStore, CurrentUser, Directory};
use crate::session::{SessionConfig, SessionId, SessionStore};
use crate::settings::SettingsHandle;

#[derive(Clone)]
pub struct AppState {
    /// Protocol endpoint of this site's role.
    pub endpoint: Arc<dyn DelegatedAuthEndpoint>,
    pub settings: SettingsHandle,
    pub directory: Arc<dyn Directory>,
    pub accounts: Arc<AccountStore>,
    pub sessions: Arc<SessionStore>,
    pub session_config: Arc<SessionConfig>,
}

impl AppState {
    /// The signed-in user, if the request carries a live session cookie.
    pub fn current_user(&self, headers: &HeaderMap) -> Option<CurrentUser> {
        let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
        let session_id = self
            .session_config
            .parse_cookie(cookie_header)
            .and_then(SessionId::from_hex)?;

        match self.sessions.get(session_id) {
            Ok(session) => session.map(|s| CurrentUser {
                account_id: s.account_id,
                session_id: Some(session_id),
            }),
            Err(e) => {
                warn!(error = %e, "Session lookup failed");
                None
            }
        }
    }
}
