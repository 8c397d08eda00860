//! Session cookie settings.

use serde::{Deserialize, Serialize};

/// How the local session cookie is issued and read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Cookie domain (optional, defaults to request host).
    #[serde(default)]
    pub cookie_domain: Option<String>,

    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,

    /// Require HTTPS for cookies (Secure flag).
    #[serde(default = "default_true")]
    pub cookie_secure: bool,

    /// SameSite attribute (Strict, Lax, None).
    #[serde(default = "default_same_site")]
    pub cookie_same_site: String,

    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
}

fn default_cookie_name() -> String {
    "handoff_session".to_string()
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_same_site() -> String {
    // The ACS is reached through a cross-site form post.
    "Lax".to_string()
}

fn default_ttl() -> u64 {
    8 * 3600
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            cookie_domain: None,
            cookie_path: default_cookie_path(),
            cookie_secure: true,
            cookie_same_site: default_same_site(),
            ttl_secs: default_ttl(),
        }
    }
}

impl SessionConfig {
    /// Build the `Set-Cookie` value for a session.
    pub fn build_cookie(&self, session_id: &str) -> String {
        self.cookie_with(session_id, self.ttl_secs)
    }

    /// Build a `Set-Cookie` value that removes the session cookie.
    pub fn clear_cookie(&self) -> String {
        self.cookie_with("", 0)
    }

    fn cookie_with(&self, value: &str, max_age: u64) -> String {
        let mut cookie = format!("{}={}", self.cookie_name, value);

        if let Some(ref domain) = self.cookie_domain {
            cookie.push_str(&format!("; Domain={}", domain));
        }

        cookie.push_str(&format!("; Path={}", self.cookie_path));

        if self.cookie_secure {
            cookie.push_str("; Secure");
        }

        cookie.push_str("; HttpOnly");
        cookie.push_str(&format!("; SameSite={}", self.cookie_same_site));
        cookie.push_str(&format!("; Max-Age={}", max_age));

        cookie
    }

    /// Extract the session cookie value from a `Cookie` header.
    pub fn parse_cookie<'a>(&self, cookie_header: &'a str) -> Option<&'a str> {
        cookie_header.split(';').find_map(|part| {
            let (name, value) = part.trim().split_once('=')?;
            (name == self.cookie_name && !value.is_empty()).then_some(value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_cookie() {
        let config = SessionConfig {
            cookie_domain: Some("site.example.lv".to_string()),
            ..Default::default()
        };

        let cookie = config.build_cookie("abc123");
        assert!(cookie.starts_with("handoff_session=abc123"));
        assert!(cookie.contains("Domain=site.example.lv"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=28800"));
    }

    #[test]
    fn test_clear_cookie() {
        let cookie = SessionConfig::default().clear_cookie();
        assert!(cookie.starts_with("handoff_session=;"));
        assert!(cookie.ends_with("Max-Age=0"));
    }

    #[test]
    fn test_parse_cookie() {
        let config = SessionConfig::default();
        assert_eq!(
            config.parse_cookie("theme=dark; handoff_session=abc123; lang=lv"),
            Some("abc123")
        );
        assert_eq!(config.parse_cookie("handoff_session="), None);
        assert_eq!(config.parse_cookie("other=abc"), None);
        assert_eq!(config.parse_cookie("handoff_session_old=abc"), None);
    }
}
