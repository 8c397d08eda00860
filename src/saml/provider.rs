//! SAML Service Provider using the HTTP-Redirect binding.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Utc};
use samael::schema::{Issuer, LogoutRequest, LogoutResponse};
use std::collections::HashSet;
use std::io::Read;
use std::sync::RwLock;
use tracing::{debug, info};

use super::client::{ProcessedResponse, SamlClient, SloMessage, SloResult};
use super::config::SamlConfig;
use super::signature::{SignatureError, XmlSignatureValidator};
use super::xml::{self as dom, Element};

const PROTOCOL_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
const ASSERTION_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";
const NAME_ID_ENTITY: &str = "urn:oasis:names:tc:SAML:2.0:nameid-format:entity";

/// SAML client backed by samael for response parsing.
pub struct RedirectBindingClient {
    config: RwLock<SamlConfig>,
}

impl RedirectBindingClient {
    pub fn new(config: SamlConfig) -> Result<Self> {
        config.validate().map_err(|e| anyhow!(e))?;

        Ok(Self {
            config: RwLock::new(config),
        })
    }

    /// Swap in a new configuration.
    pub fn reconfigure(&self, config: SamlConfig) -> Result<()> {
        config.validate().map_err(|e| anyhow!(e))?;

        let mut cfg = self
            .config
            .write()
            .map_err(|_| anyhow!("Config lock poisoned"))?;
        *cfg = config;

        Ok(())
    }

    pub fn config(&self) -> Result<SamlConfig> {
        self.config
            .read()
            .map(|c| c.clone())
            .map_err(|_| anyhow!("Config lock poisoned"))
    }

    fn redirect(&self, base: &str, param: &str, xml: &str, relay_state: &str) -> Result<String> {
        let encoded = deflate_and_encode(xml)?;
        let separator = if base.contains('?') { '&' } else { '?' };

        let mut url = format!(
            "{}{}{}={}",
            base,
            separator,
            param,
            urlencoding::encode(&encoded)
        );
        if !relay_state.is_empty() {
            url.push_str(&format!("&RelayState={}", urlencoding::encode(relay_state)));
        }
        Ok(url)
    }

    fn validate_response(
        &self,
        config: &SamlConfig,
        saml_response: &str,
    ) -> Result<String, ProcessedResponse> {
        let xml = BASE64
            .decode(saml_response.trim())
            .ok()
            .and_then(|raw| String::from_utf8(raw).ok())
            .ok_or_else(|| {
                ProcessedResponse::failure(
                    "invalid_response",
                    "SAML response is not valid base64 XML",
                )
            })?;

        let root = dom::parse(&xml).map_err(|e| {
            ProcessedResponse::failure(
                "invalid_response",
                format!("Failed to parse SAML response: {}", e),
            )
        })?;
        if !root.is(PROTOCOL_NS, "Response") {
            return Err(ProcessedResponse::failure(
                "invalid_response",
                "Document is not a SAML Response",
            ));
        }

        let mut seen = HashSet::new();
        if !root.ids().into_iter().all(|id| seen.insert(id)) {
            return Err(ProcessedResponse::failure(
                "invalid_response",
                "SAML response contains duplicate IDs",
            ));
        }

        let response: samael::schema::Response = xml.parse().map_err(|e| {
            ProcessedResponse::failure(
                "invalid_response",
                format!("Failed to parse SAML response: {}", e),
            )
        })?;

        if let Some(ref status) = response.status {
            let status_value = status.status_code.value.as_deref();
            if status_value != Some(STATUS_SUCCESS) {
                let message = status
                    .status_message
                    .as_ref()
                    .and_then(|m| m.value.clone())
                    .unwrap_or_else(|| "Unknown error".to_string());
                return Err(ProcessedResponse::failure(
                    "invalid_status",
                    format!("SAML authentication failed: {}", message),
                ));
            }
        }

        let mut assertions = root.children_named(ASSERTION_NS, "Assertion");
        let signed_assertion = match (assertions.next(), assertions.next()) {
            (Some(assertion), None) => assertion,
            (None, _) => {
                return Err(ProcessedResponse::failure(
                    "no_assertion",
                    "SAML response contains no assertion",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(ProcessedResponse::failure(
                    "invalid_response",
                    "SAML response contains more than one assertion",
                ))
            }
        };

        self.verify_signatures(config, &root, signed_assertion)?;

        // samael reads by local name only; make sure it saw the verified element.
        let assertion = response
            .assertion
            .as_ref()
            .filter(|a| Some(a.id.as_str()) == signed_assertion.attribute("ID"))
            .ok_or_else(|| {
                ProcessedResponse::failure(
                    "invalid_response",
                    "Assertion does not match the signed element",
                )
            })?;

        let now = Utc::now();
        let skew = Duration::seconds(config.clock_skew_secs);

        if config.strict {
            let issuer = assertion.issuer.value.as_deref().unwrap_or_default();
            if issuer != config.idp_entity_id {
                return Err(ProcessedResponse::failure(
                    "invalid_issuer",
                    format!("Unexpected assertion issuer: {}", issuer),
                ));
            }

            if let Some(ref destination) = response.destination {
                if *destination != config.acs_url {
                    return Err(ProcessedResponse::failure(
                        "invalid_destination",
                        format!("SAML response was sent to {}", destination),
                    ));
                }
            }

            let restrictions = assertion
                .conditions
                .as_ref()
                .and_then(|c| c.audience_restrictions.as_ref());
            if let Some(restrictions) = restrictions {
                if !restrictions
                    .iter()
                    .all(|r| r.audience.iter().any(|a| *a == config.entity_id))
                {
                    return Err(ProcessedResponse::failure(
                        "invalid_audience",
                        format!("Assertion is not addressed to {}", config.entity_id),
                    ));
                }
            }

            let confirmations = assertion
                .subject
                .as_ref()
                .and_then(|s| s.subject_confirmations.as_ref());
            if let Some(confirmations) = confirmations.filter(|c| !c.is_empty()) {
                let confirmed = confirmations.iter().any(|c| {
                    c.subject_confirmation_data.as_ref().map_or(true, |data| {
                        data.recipient.as_ref().map_or(true, |r| *r == config.acs_url)
                            && data.not_on_or_after.map_or(true, |t| now < t + skew)
                    })
                });
                if !confirmed {
                    return Err(ProcessedResponse::failure(
                        "invalid_subject_confirmation",
                        "No subject confirmation matches this service provider",
                    ));
                }
            }
        }

        if let Some(ref conditions) = assertion.conditions {
            if let Some(not_before) = conditions.not_before {
                if now < not_before - skew {
                    return Err(ProcessedResponse::failure(
                        "invalid_conditions",
                        "SAML assertion not yet valid",
                    ));
                }
            }
            if let Some(not_on_or_after) = conditions.not_on_or_after {
                if now >= not_on_or_after + skew {
                    return Err(ProcessedResponse::failure(
                        "invalid_conditions",
                        "SAML assertion has expired",
                    ));
                }
            }
        }

        let name_id = assertion
            .subject
            .as_ref()
            .and_then(|s| s.name_id.as_ref())
            .map(|n| n.value.clone())
            .ok_or_else(|| {
                ProcessedResponse::failure("no_nameid", "SAML assertion missing NameID")
            })?;

        Ok(name_id)
    }

    /// The response, the assertion, or both must carry a valid IdP signature.
    fn verify_signatures(
        &self,
        config: &SamlConfig,
        response: &Element,
        assertion: &Element,
    ) -> Result<(), ProcessedResponse> {
        let validator = idp_validator(config)
            .map_err(|e| ProcessedResponse::failure("invalid_certificate", e.to_string()))?;

        let mut signed = false;
        for element in [response, assertion] {
            match validator.verify_enveloped(element) {
                Ok(()) => signed = true,
                Err(SignatureError::Missing) => {}
                Err(e) => {
                    return Err(ProcessedResponse::failure("invalid_signature", e.to_string()))
                }
            }
        }

        if !signed {
            return Err(ProcessedResponse::failure(
                "invalid_signature",
                "SAML response is not signed by the IdP",
            ));
        }
        Ok(())
    }

    fn check_logout_response(&self, config: &SamlConfig, encoded: &str) -> SloResult {
        let logout: LogoutResponse = match inflate_message(encoded)
            .and_then(|xml| xml.parse::<LogoutResponse>().map_err(|e| anyhow!("{}", e)))
        {
            Ok(logout) => logout,
            Err(e) => return SloResult::failure("invalid_logout_response", e.to_string()),
        };

        let status = logout
            .status
            .as_ref()
            .and_then(|s| s.status_code.value.as_deref());
        if status != Some(STATUS_SUCCESS) {
            return SloResult::failure(
                "logout_not_success",
                "Logout response does not carry a Success status",
            );
        }

        if config.strict {
            if let Err(result) = check_issuer(config, logout.issuer.as_ref()) {
                return result;
            }
            if let Some(ref destination) = logout.destination {
                if *destination != config.slo_url {
                    return SloResult::failure(
                        "invalid_destination",
                        format!("Logout response was sent to {}", destination),
                    );
                }
            }
        }

        SloResult::default()
    }

    fn check_logout_request(&self, config: &SamlConfig, encoded: &str) -> SloResult {
        let request: LogoutRequest = match inflate_message(encoded)
            .and_then(|xml| xml.parse::<LogoutRequest>().map_err(|e| anyhow!("{}", e)))
        {
            Ok(request) => request,
            Err(e) => return SloResult::failure("invalid_logout_request", e.to_string()),
        };

        if config.strict {
            if let Err(result) = check_issuer(config, request.issuer.as_ref()) {
                return result;
            }
        }

        debug!("Accepting IdP-initiated logout request");
        SloResult::default()
    }

    /// Check a redirect-binding signature when the query carries one.
    ///
    /// The signed bytes are the parameters exactly as received, in the
    /// order the binding defines.
    fn check_query_signature(
        &self,
        config: &SamlConfig,
        raw_query: &str,
    ) -> Result<(), SloResult> {
        let params: Vec<(&str, &str)> = raw_query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .collect();
        let raw = |name: &str| params.iter().find(|(k, _)| *k == name).map(|(_, v)| *v);

        let (Some(signature), Some(sig_alg)) = (raw("Signature"), raw("SigAlg")) else {
            return Ok(());
        };
        let (param, message) = match (raw("SAMLResponse"), raw("SAMLRequest")) {
            (Some(message), _) => ("SAMLResponse", message),
            (None, Some(message)) => ("SAMLRequest", message),
            (None, None) => return Ok(()),
        };

        let mut signed = format!("{}={}", param, message);
        if let Some(relay_state) = raw("RelayState") {
            signed.push_str(&format!("&RelayState={}", relay_state));
        }
        signed.push_str(&format!("&SigAlg={}", sig_alg));

        let failure = |reason: String| SloResult::failure("invalid_logout_signature", reason);
        let algorithm = urlencoding::decode(sig_alg).map_err(|e| failure(e.to_string()))?;
        let signature = urlencoding::decode(signature).map_err(|e| failure(e.to_string()))?;

        idp_validator(config)
            .and_then(|v| v.verify_detached(signed.as_bytes(), &algorithm, &signature))
            .map_err(|e| failure(e.to_string()))
    }
}

fn idp_validator(config: &SamlConfig) -> Result<XmlSignatureValidator, SignatureError> {
    let pem = config
        .idp_certificate_pem
        .as_deref()
        .ok_or_else(|| SignatureError::Certificate("no IdP certificate configured".to_string()))?;
    XmlSignatureValidator::from_pem(pem)
}

fn check_issuer(config: &SamlConfig, issuer: Option<&Issuer>) -> Result<(), SloResult> {
    match issuer.and_then(|i| i.value.as_deref()) {
        Some(issuer) if issuer != config.idp_entity_id => Err(SloResult::failure(
            "invalid_issuer",
            format!("Unexpected logout issuer: {}", issuer),
        )),
        _ => Ok(()),
    }
}

impl SamlClient for RedirectBindingClient {
    fn login(&self, return_to: &str) -> Result<String> {
        let config = self.config()?;

        let request_id = format!("_id{}", uuid::Uuid::new_v4());
        let issue_instant = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let authn_request = format!(
            r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"
                xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"
                ID="{}"
                Version="2.0"
                IssueInstant="{}"
                Destination="{}"
                ProtocolBinding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST"
                AssertionConsumerServiceURL="{}">
                <saml:Issuer>{}</saml:Issuer>
            </samlp:AuthnRequest>"#,
            request_id, issue_instant, config.idp_sso_url, config.acs_url, config.entity_id
        );

        let url = self.redirect(&config.idp_sso_url, "SAMLRequest", &authn_request, return_to)?;
        debug!(url = %url, "Created SAML AuthnRequest redirect");
        Ok(url)
    }

    fn process_response(&self, saml_response: &str) -> ProcessedResponse {
        let config = match self.config() {
            Ok(config) => config,
            Err(e) => return ProcessedResponse::failure("configuration", e.to_string()),
        };

        match self.validate_response(&config, saml_response) {
            Ok(name_id) => {
                info!(idp = %config.idp_entity_id, "SAML assertion validated");
                ProcessedResponse::success(name_id)
            }
            Err(failure) => failure,
        }
    }

    fn process_slo(&self, message: &SloMessage) -> SloResult {
        let config = match self.config() {
            Ok(config) => config,
            Err(e) => return SloResult::failure("configuration", e.to_string()),
        };

        if let Some(ref raw_query) = message.raw_query {
            if let Err(failure) = self.check_query_signature(&config, raw_query) {
                return failure;
            }
        }

        if let Some(ref response) = message.saml_response {
            return self.check_logout_response(&config, response);
        }
        if let Some(ref request) = message.saml_request {
            return self.check_logout_request(&config, request);
        }

        SloResult::failure("invalid_binding", "No SAML message in logout request")
    }

    fn logout(&self, return_to: &str) -> Result<String> {
        let config = self.config()?;

        let request_id = format!("_id{}", uuid::Uuid::new_v4());
        let issue_instant = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let logout_request = format!(
            r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"
                xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"
                ID="{}"
                Version="2.0"
                IssueInstant="{}"
                Destination="{}">
                <saml:Issuer>{}</saml:Issuer>
                <saml:NameID Format="{}">{}</saml:NameID>
            </samlp:LogoutRequest>"#,
            request_id,
            issue_instant,
            config.idp_slo_url,
            config.entity_id,
            NAME_ID_ENTITY,
            config.idp_entity_id
        );

        self.redirect(&config.idp_slo_url, "SAMLRequest", &logout_request, return_to)
    }

    fn is_debug_active(&self) -> bool {
        self.config.read().map(|c| c.debug).unwrap_or(false)
    }
}

/// Deflate and base64 encode for SAML redirect binding.
fn deflate_and_encode(xml: &str) -> Result<String> {
    use std::io::Write;

    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(xml.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(BASE64.encode(compressed))
}

/// Decode a redirect-binding message; accepts deflated or plain payloads.
fn inflate_message(encoded: &str) -> Result<String> {
    let raw = BASE64
        .decode(encoded.trim())
        .context("Failed to decode SAML message")?;

    let mut inflated = String::new();
    if flate2::read::DeflateDecoder::new(raw.as_slice())
        .read_to_string(&mut inflated)
        .is_ok()
    {
        return Ok(inflated);
    }

    String::from_utf8(raw).context("SAML message is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDP_CERT: &str = include_str!("testdata/idp_cert.pem");
    const OTHER_CERT: &str = include_str!("testdata/other_cert.pem");
    const SIGNED_RESPONSE: &str = include_str!("testdata/signed_response.xml");
    const SIGNED_LOGOUT_QUERY: &str = include_str!("testdata/signed_logout_query.txt");

    fn test_config() -> SamlConfig {
        SamlConfig {
            entity_id: "https://auth.example.lv/".to_string(),
            acs_url: "https://auth.example.lv/onelogin_saml/acs".to_string(),
            slo_url: "https://auth.example.lv/onelogin_saml/sls".to_string(),
            idp_sso_url: "https://idp.example.lv/sso".to_string(),
            idp_slo_url: "https://idp.example.lv/sso".to_string(),
            idp_entity_id: "http://www.latvija.lv/sts".to_string(),
            idp_certificate_pem: Some(IDP_CERT.to_string()),
            ..Default::default()
        }
    }

    fn decode_request(url: &str) -> String {
        let encoded = url
            .split("SAMLRequest=")
            .nth(1)
            .unwrap()
            .split('&')
            .next()
            .unwrap();
        let encoded = urlencoding::decode(encoded).unwrap();
        inflate_message(&encoded).unwrap()
    }

    fn signature_block(xml: &str) -> &str {
        let start = xml.find("<ds:Signature").unwrap();
        let end = xml.find("</ds:Signature>").unwrap() + "</ds:Signature>".len();
        &xml[start..end]
    }

    fn logout_response(status: &str, issuer: &str, destination: &str) -> String {
        format!(
            r#"<samlp:LogoutResponse xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_lr" Version="2.0" Destination="{}"><saml:Issuer>{}</saml:Issuer><samlp:Status><samlp:StatusCode Value="{}"/></samlp:Status></samlp:LogoutResponse>"#,
            destination, issuer, status
        )
    }

    fn slo_response(xml: &str) -> SloMessage {
        SloMessage {
            saml_response: Some(deflate_and_encode(xml).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn test_client_requires_valid_config() {
        assert!(RedirectBindingClient::new(SamlConfig::default()).is_err());
        assert!(RedirectBindingClient::new(test_config()).is_ok());
    }

    #[test]
    fn test_login_redirect() {
        let client = RedirectBindingClient::new(test_config()).unwrap();

        let url = client.login("site.example.lv").unwrap();
        assert!(url.starts_with("https://idp.example.lv/sso?SAMLRequest="));
        assert!(url.ends_with("&RelayState=site.example.lv"));

        let xml = decode_request(&url);
        assert!(xml.contains("AuthnRequest"));
        assert!(xml.contains("https://auth.example.lv/onelogin_saml/acs"));
        assert!(xml.contains("<saml:Issuer>https://auth.example.lv/</saml:Issuer>"));
    }

    #[test]
    fn test_logout_redirect_carries_relay_state() {
        let client = RedirectBindingClient::new(test_config()).unwrap();

        let url = client.logout("site.example.lv?user=42").unwrap();
        assert!(url.contains("RelayState=site.example.lv%3Fuser%3D42"));

        let xml = decode_request(&url);
        assert!(xml.contains("LogoutRequest"));
        assert!(xml.contains(">http://www.latvija.lv/sts</saml:NameID>"));
    }

    #[test]
    fn test_malformed_response_is_reported() {
        let client = RedirectBindingClient::new(test_config()).unwrap();

        let result = client.process_response("%%% not base64");
        assert!(!result.is_valid());
        assert_eq!(result.errors, vec!["invalid_response".to_string()]);
        assert!(result.last_error_reason.is_some());
        assert!(result.name_id.is_none());

        let result = client.process_response(&BASE64.encode("<not-a-response/>"));
        assert!(!result.is_valid());
        assert!(result.name_id.is_none());
    }

    #[test]
    fn test_signed_response_is_accepted() {
        let client = RedirectBindingClient::new(test_config()).unwrap();

        let result = client.process_response(&BASE64.encode(SIGNED_RESPONSE));
        assert!(result.is_valid(), "{:?}", result);
        assert_eq!(result.name_id.as_deref(), Some("PK:123456-78901"));
    }

    #[test]
    fn test_unsigned_response_is_rejected() {
        let client = RedirectBindingClient::new(test_config()).unwrap();
        let certificate: String = IDP_CERT
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .collect();

        // Forged identity, no signature, the pinned certificate quoted in a comment.
        let forged = SIGNED_RESPONSE
            .replace(signature_block(SIGNED_RESPONSE), "")
            .replace("PK:123456-78901", "PK:010101-10101")
            .replace(
                "<samlp:Status>",
                &format!(
                    "<!-- <ds:X509Certificate>{}</ds:X509Certificate> --><samlp:Status>",
                    certificate
                ),
            );

        let result = client.process_response(&BASE64.encode(forged));
        assert_eq!(result.errors, vec!["invalid_signature".to_string()]);
        assert!(result.name_id.is_none());
    }

    #[test]
    fn test_tampered_or_foreign_signature_is_rejected() {
        let client = RedirectBindingClient::new(test_config()).unwrap();
        let tampered = SIGNED_RESPONSE.replace("PK:123456-78901", "PK:010101-10101");
        let result = client.process_response(&BASE64.encode(tampered));
        assert_eq!(result.errors, vec!["invalid_signature".to_string()]);

        let mut config = test_config();
        config.idp_certificate_pem = Some(OTHER_CERT.to_string());
        let client = RedirectBindingClient::new(config).unwrap();
        let result = client.process_response(&BASE64.encode(SIGNED_RESPONSE));
        assert_eq!(result.errors, vec!["invalid_signature".to_string()]);
    }

    #[test]
    fn test_wrapped_or_duplicated_assertions_are_rejected() {
        let client = RedirectBindingClient::new(test_config()).unwrap();

        let wrapped = SIGNED_RESPONSE.replace(
            "</samlp:Response>",
            r#"<saml:Assertion ID="_evil" Version="2.0" IssueInstant="2024-03-14T10:00:00Z"><saml:Issuer>http://www.latvija.lv/sts</saml:Issuer></saml:Assertion></samlp:Response>"#,
        );
        let result = client.process_response(&BASE64.encode(wrapped));
        assert_eq!(result.errors, vec!["invalid_response".to_string()]);

        let duplicate_id = SIGNED_RESPONSE.replace(r#"ID="_r1""#, r#"ID="_a1""#);
        let result = client.process_response(&BASE64.encode(duplicate_id));
        assert_eq!(result.errors, vec!["invalid_response".to_string()]);
    }

    #[test]
    fn test_strict_mode_checks_destination_and_audience() {
        let mut config = test_config();
        config.acs_url = "https://other.example.lv/onelogin_saml/acs".to_string();
        let client = RedirectBindingClient::new(config).unwrap();
        let result = client.process_response(&BASE64.encode(SIGNED_RESPONSE));
        assert_eq!(result.errors, vec!["invalid_destination".to_string()]);

        let mut config = test_config();
        config.entity_id = "https://other.example.lv/".to_string();
        let client = RedirectBindingClient::new(config.clone()).unwrap();
        let result = client.process_response(&BASE64.encode(SIGNED_RESPONSE));
        assert_eq!(result.errors, vec!["invalid_audience".to_string()]);

        config.strict = false;
        client.reconfigure(config).unwrap();
        assert!(client.process_response(&BASE64.encode(SIGNED_RESPONSE)).is_valid());
    }

    #[test]
    fn test_logout_response_status() {
        let client = RedirectBindingClient::new(test_config()).unwrap();
        let issuer = "http://www.latvija.lv/sts";
        let slo_url = "https://auth.example.lv/onelogin_saml/sls";

        let success = logout_response(STATUS_SUCCESS, issuer, slo_url);
        assert!(client.process_slo(&slo_response(&success)).errors.is_empty());

        let denied = logout_response(
            "urn:oasis:names:tc:SAML:2.0:status:Requester",
            issuer,
            slo_url,
        );
        assert_eq!(
            client.process_slo(&slo_response(&denied)).errors,
            vec!["logout_not_success".to_string()]
        );

        // The success URI quoted in a message is not a success status.
        let quoted = denied.replace(
            "</samlp:Status>",
            &format!(
                "<samlp:StatusMessage>Value=\"{}\"</samlp:StatusMessage></samlp:Status>",
                STATUS_SUCCESS
            ),
        );
        assert_eq!(
            client.process_slo(&slo_response(&quoted)).errors,
            vec!["logout_not_success".to_string()]
        );

        let malformed = format!("<samlp:LogoutResponse Value=\"{}\"", STATUS_SUCCESS);
        assert_eq!(
            client.process_slo(&slo_response(&malformed)).errors,
            vec!["invalid_logout_response".to_string()]
        );

        let empty = client.process_slo(&SloMessage::default());
        assert_eq!(empty.errors, vec!["invalid_binding".to_string()]);
    }

    #[test]
    fn test_logout_response_strict_checks() {
        let client = RedirectBindingClient::new(test_config()).unwrap();

        let foreign = logout_response(
            STATUS_SUCCESS,
            "https://evil.example/",
            "https://auth.example.lv/onelogin_saml/sls",
        );
        assert_eq!(
            client.process_slo(&slo_response(&foreign)).errors,
            vec!["invalid_issuer".to_string()]
        );

        let misdirected = logout_response(
            STATUS_SUCCESS,
            "http://www.latvija.lv/sts",
            "https://other.example.lv/sls",
        );
        assert_eq!(
            client.process_slo(&slo_response(&misdirected)).errors,
            vec!["invalid_destination".to_string()]
        );
    }

    #[test]
    fn test_idp_initiated_logout_request() {
        let client = RedirectBindingClient::new(test_config()).unwrap();

        let request = r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_lq" Version="2.0"><saml:Issuer>http://www.latvija.lv/sts</saml:Issuer><saml:NameID>PK:123456-78901</saml:NameID></samlp:LogoutRequest>"#;
        let message = SloMessage {
            saml_request: Some(deflate_and_encode(request).unwrap()),
            ..Default::default()
        };
        assert!(client.process_slo(&message).errors.is_empty());

        let garbage = SloMessage {
            saml_request: Some("anything".to_string()),
            ..Default::default()
        };
        assert_eq!(
            client.process_slo(&garbage).errors,
            vec!["invalid_logout_request".to_string()]
        );
    }

    #[test]
    fn test_redirect_signature_on_logout_response() {
        let client = RedirectBindingClient::new(test_config()).unwrap();
        let raw_query = SIGNED_LOGOUT_QUERY.trim();
        let saml_response = raw_query
            .split('&')
            .find_map(|pair| pair.strip_prefix("SAMLResponse="))
            .map(|v| urlencoding::decode(v).unwrap().into_owned());

        let signed = SloMessage {
            saml_response: saml_response.clone(),
            saml_request: None,
            raw_query: Some(raw_query.to_string()),
        };
        assert!(client.process_slo(&signed).errors.is_empty());

        let redirected = SloMessage {
            saml_response,
            saml_request: None,
            raw_query: Some(raw_query.replace("site.example.lv", "evil.example.lv")),
        };
        assert_eq!(
            client.process_slo(&redirected).errors,
            vec!["invalid_logout_signature".to_string()]
        );
    }

    #[test]
    fn test_reconfigure_debug_flag() {
        let client = RedirectBindingClient::new(test_config()).unwrap();
        assert!(!client.is_debug_active());

        let mut config = test_config();
        config.debug = true;
        client.reconfigure(config).unwrap();
        assert!(client.is_debug_active());

        assert!(client.reconfigure(SamlConfig::default()).is_err());
        assert!(client.is_debug_active());
    }
}
