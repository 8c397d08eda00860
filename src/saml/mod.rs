//! SAML Service Provider for the auth host.
//!
//! Starts logins and logouts at the IdP over the HTTP-Redirect binding and
//! validates the responses it posts back. Signatures are checked against
//! the pinned IdP certificate over the canonical XML of the signed element.

pub mod client;
pub mod config;
pub mod provider;
pub mod signature;
pub mod xml;

pub use client::{ProcessedResponse, SamlClient, SloMessage, SloResult};
pub use config::SamlConfig;
pub use provider::RedirectBindingClient;
