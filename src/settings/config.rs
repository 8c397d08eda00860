//! Environment-level settings and the persisted module configuration.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};
use x509_parser::pem::parse_x509_pem;
use zeroize::Zeroizing;

/// Generic error shown to end users, Latvian.
pub const GENERIC_ERROR_LV: &str = "Kaut kas nogāja greizi, lūdzu sazinies ar lapas uzturētāju!";

/// Generic error shown to end users, English.
pub const GENERIC_ERROR_EN: &str = "Something went wrong, contact page administrator.";

/// Where the shared encryption key comes from.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Key text passed directly (flag or environment).
    Inline(String),
    /// Key text stored in a file, re-read on every use.
    File(PathBuf),
}

impl KeySource {
    /// Read the current key text.
    pub fn read(&self) -> Result<Zeroizing<String>> {
        match self {
            KeySource::Inline(key) => Ok(Zeroizing::new(key.trim().to_string())),
            KeySource::File(path) => {
                let raw = Zeroizing::new(
                    std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read crypt key: {:?}", path))?,
                );
                Ok(Zeroizing::new(raw.trim().to_string()))
            }
        }
    }
}

/// Calendar used for day tokens. Both sites must agree on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenTimezone {
    #[default]
    Utc,
    Local,
}

impl FromStr for TokenTimezone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utc" => Ok(TokenTimezone::Utc),
            "local" => Ok(TokenTimezone::Local),
            other => Err(format!("unknown token timezone: {}", other)),
        }
    }
}

/// Language of user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    Lv,
    En,
}

impl Locale {
    /// The generic failure message in this locale.
    pub fn generic_error(&self) -> &'static str {
        match self {
            Locale::Lv => GENERIC_ERROR_LV,
            Locale::En => GENERIC_ERROR_EN,
        }
    }

    /// Value for the HTML `lang` attribute.
    pub fn tag(&self) -> &'static str {
        match self {
            Locale::Lv => "lv",
            Locale::En => "en",
        }
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lv" => Ok(Locale::Lv),
            "en" => Ok(Locale::En),
            other => Err(format!("unknown locale: {}", other)),
        }
    }
}

/// Settings fixed for the process lifetime (outside the editable config).
#[derive(Debug, Clone)]
pub struct HandoffSettings {
    /// Host name of this site.
    pub site_host: String,

    /// Host of the designated auth site. Empty means this site is the auth site.
    pub auth_path: String,

    /// IdP SSO/SLO endpoint.
    pub idp_saml_path: String,

    /// IdP entity ID.
    pub idp_entity_id: String,

    /// Shared encryption key, also used for day tokens.
    pub crypt_key: KeySource,

    /// Process-wide salt for identifier lookup hashes.
    pub hash_salt: String,

    /// Calendar used for day tokens.
    pub token_timezone: TokenTimezone,

    /// URL scheme used when addressing other sites.
    pub scheme: String,

    /// Path prefix of the protocol endpoints.
    pub base_path: String,

    /// Language of user-facing messages.
    pub locale: Locale,

    /// IdP certificate fallback when the module config carries none.
    pub cert_file: PathBuf,
}

fn default_idp_entity_id() -> String {
    "http://www.latvija.lv/sts".to_string()
}

fn default_base_path() -> String {
    "/onelogin_saml".to_string()
}

impl Default for HandoffSettings {
    fn default() -> Self {
        Self {
            site_host: String::new(),
            auth_path: String::new(),
            idp_saml_path: String::new(),
            idp_entity_id: default_idp_entity_id(),
            crypt_key: KeySource::Inline(String::new()),
            hash_salt: String::new(),
            token_timezone: TokenTimezone::Utc,
            scheme: "https".to_string(),
            base_path: default_base_path(),
            locale: Locale::Lv,
            cert_file: PathBuf::from("certs/latvia_auth/cert.txt"),
        }
    }
}

impl HandoffSettings {
    /// Validate the settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.site_host.is_empty() {
            return Err("site_host is required".to_string());
        }

        if self.hash_salt.is_empty() {
            return Err("hash_salt is required".to_string());
        }

        if !self.base_path.starts_with('/') || self.base_path.ends_with('/') {
            return Err(format!(
                "base_path must start and not end with '/': {}",
                self.base_path
            ));
        }

        if self.is_auth_host() && self.idp_saml_path.is_empty() {
            return Err("idp_saml_path is required on the auth host".to_string());
        }

        Ok(())
    }

    /// Whether this process is the designated auth host.
    pub fn is_auth_host(&self) -> bool {
        self.auth_path.is_empty() || self.auth_path == self.site_host
    }

    /// Host of the auth site.
    pub fn auth_host(&self) -> &str {
        if self.auth_path.is_empty() {
            &self.site_host
        } else {
            &self.auth_path
        }
    }

    /// Path of a protocol endpoint on any site, e.g. `/onelogin_saml/acs`.
    pub fn endpoint_path(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_path, endpoint)
    }

    /// Absolute URL of a protocol endpoint on `host`.
    pub fn endpoint_url(&self, host: &str, endpoint: &str) -> String {
        format!("{}://{}{}", self.scheme, host, self.endpoint_path(endpoint))
    }
}

/// Module configuration, persisted as JSON and editable by administrators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleConfig {
    /// Enable delegated authentication and reroute local logout.
    #[serde(default)]
    pub activate: bool,

    /// IdP X.509 certificate (PEM).
    #[serde(default)]
    pub cert: Option<String>,

    /// SP private key (PEM).
    #[serde(default)]
    pub private_key: Option<String>,

    /// Disable login with local accounts.
    #[serde(default)]
    pub disable_default_login: bool,

    /// Disable setting local passwords.
    #[serde(default)]
    pub disable_set_local_password: bool,

    /// Log detailed IdP error reasons.
    #[serde(default)]
    pub debug: bool,
}

impl ModuleConfig {
    /// Validate the PEM material, when present.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref cert) = self.cert {
            if !cert.trim().is_empty() {
                parse_certificate(cert)?;
            }
        }

        if let Some(ref key) = self.private_key {
            if !key.trim().is_empty() {
                let (_, pem) = parse_x509_pem(key.trim().as_bytes())
                    .map_err(|e| format!("private_key is not valid PEM: {:?}", e))?;
                if !pem.label.ends_with("PRIVATE KEY") {
                    return Err(format!("private_key has unexpected PEM label: {}", pem.label));
                }
            }
        }

        Ok(())
    }

    /// IdP certificate from the config, or from `fallback` on disk.
    pub fn certificate_pem(&self, fallback: &Path) -> Result<String> {
        let pem = match self.cert.as_deref().map(str::trim) {
            Some(cert) if !cert.is_empty() => cert.to_string(),
            _ => std::fs::read_to_string(fallback)
                .with_context(|| format!("Failed to read IdP certificate: {:?}", fallback))?,
        };

        parse_certificate(&pem).map_err(|e| anyhow!(e))?;
        Ok(pem)
    }
}

fn parse_certificate(pem: &str) -> Result<(), String> {
    let (_, pem) = parse_x509_pem(pem.trim().as_bytes())
        .map_err(|e| format!("cert is not valid PEM: {:?}", e))?;
    pem.parse_x509()
        .map_err(|e| format!("cert is not a valid X.509 certificate: {:?}", e))?;
    Ok(())
}

/// Partial module configuration merged over the current one.
///
/// Keys are kebab-case; the snake_case and legacy spellings deployed sites
/// still carry are accepted, anything else is an error.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ModuleConfigJson {
    pub activate: Option<bool>,
    pub cert: Option<String>,
    #[serde(alias = "private_key", alias = "privatekey")]
    pub private_key: Option<String>,
    #[serde(alias = "disable_default_login")]
    pub disable_default_login: Option<bool>,
    #[serde(alias = "disable_set_local_password", alias = "disable_set_drupal_pwd")]
    pub disable_set_local_password: Option<bool>,
    pub debug: Option<bool>,
}

impl ModuleConfigJson {
    /// Merge into an existing config.
    pub fn apply_to(&self, config: &mut ModuleConfig) {
        if let Some(activate) = self.activate {
            config.activate = activate;
        }
        if let Some(ref cert) = self.cert {
            config.cert = Some(cert.clone());
        }
        if let Some(ref key) = self.private_key {
            config.private_key = Some(key.clone());
        }
        if let Some(disable) = self.disable_default_login {
            config.disable_default_login = disable;
        }
        if let Some(disable) = self.disable_set_local_password {
            config.disable_set_local_password = disable;
        }
        if let Some(debug) = self.debug {
            config.debug = debug;
        }
    }
}

/// Load the module config from a JSON file. A missing file yields defaults.
pub fn load_module_config(path: &Path) -> Result<ModuleConfig> {
    if !path.exists() {
        warn!(path = ?path, "Module config not found, using defaults");
        return Ok(ModuleConfig::default());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read module config: {:?}", path))?;
    let partial: ModuleConfigJson = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse module config: {:?}", path))?;

    let mut config = ModuleConfig::default();
    partial.apply_to(&mut config);
    config.validate().map_err(|e| anyhow!(e))?;

    info!(path = ?path, activate = config.activate, "Module config loaded");
    Ok(config)
}

/// Shared view of the settings, cloned per request.
#[derive(Clone)]
pub struct SettingsHandle {
    site: Arc<HandoffSettings>,
    module: Arc<RwLock<ModuleConfig>>,
}

impl SettingsHandle {
    pub fn new(site: HandoffSettings, module: ModuleConfig) -> Self {
        Self {
            site: Arc::new(site),
            module: Arc::new(RwLock::new(module)),
        }
    }

    /// Environment-level settings.
    pub fn site(&self) -> &HandoffSettings {
        &self.site
    }

    /// Snapshot of the module config.
    pub fn module(&self) -> Result<ModuleConfig> {
        self.module
            .read()
            .map(|c| c.clone())
            .map_err(|_| anyhow!("Module config lock poisoned"))
    }

    /// Replace the module config after validating it.
    pub fn reconfigure(&self, config: ModuleConfig) -> Result<()> {
        config.validate().map_err(|e| anyhow!(e))?;

        let mut current = self
            .module
            .write()
            .map_err(|_| anyhow!("Module config lock poisoned"))?;
        *current = config;

        Ok(())
    }
}
