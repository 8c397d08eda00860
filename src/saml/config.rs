//! SAML Service Provider configuration.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::settings::{HandoffSettings, ModuleConfig};

/// SAML Service Provider configuration for the auth host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamlConfig {
    /// SP Entity ID.
    #[serde(default)]
    pub entity_id: String,

    /// Assertion Consumer Service URL (where the IdP posts the SAML response).
    #[serde(default)]
    pub acs_url: String,

    /// Single Logout Service URL (where the IdP sends logout responses).
    #[serde(default)]
    pub slo_url: String,

    /// IdP SSO URL (HTTP-Redirect binding).
    #[serde(default)]
    pub idp_sso_url: String,

    /// IdP SLO URL (HTTP-Redirect binding).
    #[serde(default)]
    pub idp_slo_url: String,

    /// IdP Entity ID.
    #[serde(default)]
    pub idp_entity_id: String,

    /// IdP certificate (PEM format).
    #[serde(default)]
    pub idp_certificate_pem: Option<String>,

    /// SP private key (PEM format).
    #[serde(default)]
    pub private_key_pem: Option<String>,

    /// Reject assertions from any issuer but the configured IdP.
    #[serde(default = "default_true")]
    pub strict: bool,

    /// Report detailed error reasons.
    #[serde(default)]
    pub debug: bool,

    /// Clock skew tolerance in seconds.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: i64,
}

fn default_true() -> bool {
    true
}

fn default_clock_skew() -> i64 {
    300 // 5 minutes
}

impl Default for SamlConfig {
    fn default() -> Self {
        Self {
            entity_id: String::new(),
            acs_url: String::new(),
            slo_url: String::new(),
            idp_sso_url: String::new(),
            idp_slo_url: String::new(),
            idp_entity_id: String::new(),
            idp_certificate_pem: None,
            private_key_pem: None,
            strict: true,
            debug: false,
            clock_skew_secs: default_clock_skew(),
        }
    }
}

impl SamlConfig {
    /// Derive the SP settings of the auth host.
    ///
    /// The IdP certificate comes from the module config, falling back to
    /// the certificate file; without one the client cannot be built.
    pub fn from_settings(site: &HandoffSettings, module: &ModuleConfig) -> Result<Self> {
        let auth_host = site.auth_host();
        let certificate = module.certificate_pem(&site.cert_file)?;

        let config = Self {
            entity_id: format!("{}://{}/", site.scheme, auth_host),
            acs_url: site.endpoint_url(auth_host, "acs"),
            slo_url: site.endpoint_url(auth_host, "sls"),
            idp_sso_url: site.idp_saml_path.clone(),
            idp_slo_url: site.idp_saml_path.clone(),
            idp_entity_id: site.idp_entity_id.clone(),
            idp_certificate_pem: Some(certificate),
            private_key_pem: module.private_key.clone().filter(|k| !k.trim().is_empty()),
            strict: true,
            debug: module.debug,
            clock_skew_secs: default_clock_skew(),
        };

        config.validate().map_err(|e| anyhow!(e))?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.entity_id.is_empty() {
            return Err("SAML entity_id is required".to_string());
        }

        if self.acs_url.is_empty() {
            return Err("SAML acs_url is required".to_string());
        }

        if self.idp_sso_url.is_empty() || self.idp_entity_id.is_empty() {
            return Err("SAML requires idp_sso_url and idp_entity_id".to_string());
        }

        if self.idp_certificate_pem.is_none() {
            return Err("SAML requires the IdP certificate".to_string());
        }

        Ok(())
    }
}
