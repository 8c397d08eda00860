//! The capability shared by both roles.

use std::sync::Arc;

use super::types::{AcsForm, Outcome, SloRequest, SlsRequest, SsoRequest};
use crate::crypto::Cryptor;
use crate::handoff::{HandoffCodec, TokenAuthority};
use crate::settings::SettingsHandle;

/// The four protocol endpoints, implemented once per role.
pub trait DelegatedAuthEndpoint: Send + Sync {
    fn single_sign_on(&self, req: &SsoRequest) -> Outcome;

    fn assertion_consumer_service(&self, form: &AcsForm) -> Outcome;

    fn single_log_out(&self, req: &SloRequest) -> Outcome;

    fn single_log_out_service(&self, req: &SlsRequest) -> Outcome;
}

/// Collaborators both roles need.
#[derive(Clone)]
pub struct HandoffContext {
    pub settings: SettingsHandle,
    pub cryptor: Arc<Cryptor>,
    pub codec: Arc<HandoffCodec>,
    pub tokens: Arc<dyn TokenAuthority>,
}

impl HandoffContext {
    pub fn generic_error(&self) -> &'static str {
        self.settings.site().locale.generic_error()
    }

    pub fn error(&self) -> Outcome {
        Outcome::Error {
            message: self.generic_error(),
        }
    }
}
