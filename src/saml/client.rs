//! Contract between the auth host and the SAML toolkit.

/// Outcome of validating an IdP response posted to the ACS endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedResponse {
    /// Short error codes; empty when the response is valid.
    pub errors: Vec<String>,
    /// Human-readable reason of the last failure.
    pub last_error_reason: Option<String>,
    /// Subject NameID of a valid assertion.
    pub name_id: Option<String>,
}

impl ProcessedResponse {
    pub fn success(name_id: impl Into<String>) -> Self {
        Self {
            name_id: Some(name_id.into()),
            ..Default::default()
        }
    }

    pub fn failure(code: &str, reason: impl Into<String>) -> Self {
        Self {
            errors: vec![code.to_string()],
            last_error_reason: Some(reason.into()),
            name_id: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Logout message received on the SLS endpoint.
#[derive(Debug, Clone, Default)]
pub struct SloMessage {
    pub saml_response: Option<String>,
    pub saml_request: Option<String>,
    /// Query string as received, for `Signature` / `SigAlg` checks.
    pub raw_query: Option<String>,
}

/// Outcome of processing a logout message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SloResult {
    pub errors: Vec<String>,
    pub last_error_reason: Option<String>,
}

impl SloResult {
    pub fn failure(code: &str, reason: impl Into<String>) -> Self {
        Self {
            errors: vec![code.to_string()],
            last_error_reason: Some(reason.into()),
        }
    }
}

/// SAML Service Provider operations used by the auth host.
///
/// Implementations build redirect URLs rather than emitting responses, so
/// handlers stay free of transport concerns.
pub trait SamlClient: Send + Sync {
    /// Redirect URL starting an SP-initiated login that returns to `return_to`.
    fn login(&self, return_to: &str) -> anyhow::Result<String>;

    /// Validate a base64-encoded SAML response.
    fn process_response(&self, saml_response: &str) -> ProcessedResponse;

    /// Validate a logout response or request from the IdP.
    fn process_slo(&self, message: &SloMessage) -> SloResult;

    /// Redirect URL starting a logout at the IdP that returns to `return_to`.
    fn logout(&self, return_to: &str) -> anyhow::Result<String>;

    /// Whether detailed error reasons may be logged.
    fn is_debug_active(&self) -> bool;
}
