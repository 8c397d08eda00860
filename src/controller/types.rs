//! Protocol requests and outcomes.
//!
//! Requests are reconstructed entirely from redirect parameters and the
//! caller's session; handlers map them to an [`Outcome`] that the HTTP
//! layer renders.

use serde::Deserialize;

use super::endpoint::DelegatedAuthEndpoint;
use crate::directory::{CurrentUser, SessionGrant};

pub const LOGIN_PATH: &str = "/user/login";
pub const HOME_PATH: &str = "/";

/// Login page reporting a failed delegated login.
pub fn login_error_path() -> String {
    format!("{}?error=1", LOGIN_PATH)
}

/// Canonical page of an account.
pub fn account_path(account_id: &str) -> String {
    format!("/user/{}", account_id)
}

/// Query of `GET {base}/sso`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SsoQuery {
    #[serde(rename = "returnTo")]
    pub return_to: Option<String>,
}

/// Form of `POST {base}/acs`. The auth host reads the SAML fields, a
/// satellite reads the handoff fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcsForm {
    #[serde(rename = "SAMLResponse")]
    pub saml_response: Option<String>,
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
    #[serde(rename = "TVPAuthResponse")]
    pub handoff_payload: Option<String>,
    #[serde(rename = "TVPToken")]
    pub handoff_token: Option<String>,
}

/// Query of `{base}/slo`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SloQuery {
    pub user: Option<String>,
    pub token: Option<String>,
    #[serde(rename = "returnTo")]
    pub return_to: Option<String>,
}

/// Query of `GET {base}/sls`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlsQuery {
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
    #[serde(rename = "SAMLResponse")]
    pub saml_response: Option<String>,
    #[serde(rename = "SAMLRequest")]
    pub saml_request: Option<String>,
    pub user: Option<String>,
    pub token: Option<String>,
    /// Undecoded query string, needed to check a redirect-binding signature.
    #[serde(skip)]
    pub raw_query: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SsoRequest {
    pub query: SsoQuery,
    pub current: Option<CurrentUser>,
}

#[derive(Debug, Clone)]
pub struct SloRequest {
    pub query: SloQuery,
    pub current: Option<CurrentUser>,
}

#[derive(Debug, Clone)]
pub struct SlsRequest {
    pub query: SlsQuery,
    pub current: Option<CurrentUser>,
}

/// Every inbound protocol request.
#[derive(Debug, Clone)]
pub enum ProtocolRequest {
    SingleSignOn(SsoRequest),
    AssertionConsumer(AcsForm),
    SingleLogOut(SloRequest),
    SingleLogOutService(SlsRequest),
}

impl ProtocolRequest {
    pub fn dispatch(&self, endpoint: &dyn DelegatedAuthEndpoint) -> Outcome {
        match self {
            ProtocolRequest::SingleSignOn(req) => endpoint.single_sign_on(req),
            ProtocolRequest::AssertionConsumer(form) => endpoint.assertion_consumer_service(form),
            ProtocolRequest::SingleLogOut(req) => endpoint.single_log_out(req),
            ProtocolRequest::SingleLogOutService(req) => endpoint.single_log_out_service(req),
        }
    }
}

/// Auto-submitting form carrying the handoff to a satellite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayForm {
    /// Satellite ACS URL.
    pub action: String,
    /// Sealed identifier, empty when the exchange failed.
    pub data: String,
    pub token: String,
    /// Generic message shown instead of submitting.
    pub error: Option<&'static str>,
}

/// What the HTTP layer should send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Redirect { location: String },
    SignedIn { location: String, grant: SessionGrant },
    SignedOut { location: String },
    Relay(RelayForm),
    Error { message: &'static str },
}

impl Outcome {
    pub fn redirect(location: impl Into<String>) -> Self {
        Outcome::Redirect {
            location: location.into(),
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            Outcome::Redirect { location }
            | Outcome::SignedIn { location, .. }
            | Outcome::SignedOut { location } => Some(location),
            _ => None,
        }
    }
}

/// A bare host name, optionally with a port.
pub fn is_valid_host(host: &str) -> bool {
    !host.is_empty()
        && host.len() <= 253
        && !host.starts_with('.')
        && !host.starts_with('-')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'))
}

/// Redirect target on this site that does not lead back into SSO.
pub fn local_target(target: Option<&str>, sso_path: &str) -> Option<String> {
    let target = target?.trim();
    if !target.starts_with('/') || target.starts_with("//") || target.contains('\\') {
        return None;
    }
    if target.contains(sso_path) {
        return None;
    }
    Some(target.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_validation() {
        assert!(is_valid_host("site.example.lv"));
        assert!(is_valid_host("localhost:8080"));
        assert!(!is_valid_host(""));
        assert!(!is_valid_host("evil.example/path"));
        assert!(!is_valid_host("user@evil.example"));
        assert!(!is_valid_host("site.example.lv?x=1"));
        assert!(!is_valid_host(".example.lv"));
        assert!(!is_valid_host("a b"));
    }

    #[test]
    fn test_local_target() {
        let sso = "/onelogin_saml/sso";
        assert_eq!(local_target(Some("/node/5"), sso), Some("/node/5".to_string()));
        assert_eq!(local_target(Some("/onelogin_saml/sso?returnTo=x"), sso), None);
        assert_eq!(local_target(Some("//evil.example"), sso), None);
        assert_eq!(local_target(Some("https://evil.example"), sso), None);
        assert_eq!(local_target(Some("/\\evil.example"), sso), None);
        assert_eq!(local_target(None, sso), None);
    }

    #[test]
    fn test_acs_form_field_names() {
        let form: AcsForm =
            serde_urlencoded::from_str("TVPAuthResponse=abc&TVPToken=def&RelayState=site.lv")
                .unwrap();
        assert_eq!(form.handoff_payload.as_deref(), Some("abc"));
        assert_eq!(form.handoff_token.as_deref(), Some("def"));
        assert_eq!(form.relay_state.as_deref(), Some("site.lv"));
        assert!(form.saml_response.is_none());
    }

    #[test]
    fn test_paths() {
        assert_eq!(login_error_path(), "/user/login?error=1");
        assert_eq!(account_path("42"), "/user/42");
    }
}
