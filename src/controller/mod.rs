//! The cross-domain identity handoff state machine.
//!
//! One [`DelegatedAuthEndpoint`] implementation per role, chosen once at
//! start-up: [`AuthBroker`] on the auth host, [`Satellite`] everywhere else.

pub mod auth_host;
pub mod endpoint;
pub mod finalizer;
pub mod satellite;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use auth_host::AuthBroker;
pub use endpoint::{DelegatedAuthEndpoint, HandoffContext};
pub use satellite::Satellite;
pub use types::{
    AcsForm, Outcome, ProtocolRequest, RelayForm, SloQuery, SloRequest, SlsQuery, SlsRequest,
    SsoQuery, SsoRequest, HOME_PATH, LOGIN_PATH,
};
