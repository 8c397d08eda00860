//! The auth host: talks to the IdP and hands identities to satellites.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::endpoint::{DelegatedAuthEndpoint, HandoffContext};
use super::types::{
    is_valid_host, local_target, AcsForm, Outcome, RelayForm, SloRequest, SlsRequest, SsoRequest,
    HOME_PATH,
};
use crate::handoff::PersonalIdentifier;
use crate::saml::{SamlClient, SloMessage};

pub struct AuthBroker {
    ctx: HandoffContext,
    saml: Arc<dyn SamlClient>,
}

impl AuthBroker {
    pub fn new(ctx: HandoffContext, saml: Arc<dyn SamlClient>) -> Self {
        Self { ctx, saml }
    }

    fn failed_relay(&self, action: String, token: String) -> Outcome {
        Outcome::Relay(RelayForm {
            action,
            data: String::new(),
            token,
            error: Some(self.ctx.generic_error()),
        })
    }

    fn log_saml_errors(&self, context: &str, errors: &[String], reason: Option<&str>) {
        if self.saml.is_debug_active() {
            error!(
                errors = %errors.join(", "),
                reason = reason.unwrap_or_default(),
                "{}",
                context
            );
        } else {
            error!(errors = %errors.join(", "), "{}", context);
        }
    }
}

impl DelegatedAuthEndpoint for AuthBroker {
    fn single_sign_on(&self, req: &SsoRequest) -> Outcome {
        let sso_path = self.ctx.settings.site().endpoint_path("sso");
        let target = req.query.return_to.as_deref();

        if req.current.is_some() {
            return Outcome::redirect(
                local_target(target, &sso_path).unwrap_or_else(|| HOME_PATH.to_string()),
            );
        }

        let relay_state = target.filter(|t| !t.contains(&sso_path)).unwrap_or_default();
        match self.saml.login(relay_state) {
            Ok(url) => {
                debug!(relay_state = %relay_state, "Redirecting to IdP for login");
                Outcome::redirect(url)
            }
            Err(e) => {
                error!(error = %e, "Failed to start SAML login");
                self.ctx.error()
            }
        }
    }

    fn assertion_consumer_service(&self, form: &AcsForm) -> Outcome {
        let relay = form.relay_state.as_deref().map(str::trim).unwrap_or_default();
        let saml_response = form.saml_response.as_deref().unwrap_or_default();

        if relay.is_empty() || saml_response.trim().is_empty() {
            warn!("ACS request without RelayState or SAMLResponse");
            return self.ctx.error();
        }
        if !is_valid_host(relay) {
            warn!(relay_state = %relay, "ACS RelayState is not a host name");
            return self.ctx.error();
        }

        let site = self.ctx.settings.site();
        let action = site.endpoint_url(relay, "acs");
        let token = match self.ctx.tokens.issue(relay) {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "Cannot issue handoff token");
                return self.ctx.error();
            }
        };

        let processed = self.saml.process_response(saml_response);
        if !processed.is_valid() {
            self.log_saml_errors(
                "There was at least one error processing the SAML Response",
                &processed.errors,
                processed.last_error_reason.as_deref(),
            );
            return self.failed_relay(action, token);
        }

        let Some(identifier) = processed.name_id.as_deref().and_then(PersonalIdentifier::parse)
        else {
            error!("There was at least one error processing the SAML Response: no personal code found in SAML response");
            return self.failed_relay(action, token);
        };

        match self.ctx.codec.encode(&identifier) {
            Ok(payload) => {
                info!(satellite = %relay, "Identity handoff issued");
                Outcome::Relay(RelayForm {
                    action,
                    data: payload.into_inner(),
                    token,
                    error: None,
                })
            }
            Err(e) => {
                error!(error = %e, "Failed to seal identity handoff");
                self.failed_relay(action, token)
            }
        }
    }

    fn single_log_out(&self, req: &SloRequest) -> Outcome {
        let q = &req.query;
        let (Some(return_to), Some(token), Some(user)) =
            (q.return_to.as_deref(), q.token.as_deref(), q.user.as_deref())
        else {
            warn!("SLO request missing returnTo, user or token");
            return self.ctx.error();
        };

        if !is_valid_host(return_to) || !self.ctx.tokens.verify(return_to, token) {
            warn!(satellite = %return_to, "SLO token rejected");
            return self.ctx.error();
        }

        let relay_state = format!("{}?user={}", return_to, urlencoding::encode(user));
        match self.saml.logout(&relay_state) {
            Ok(url) => {
                info!(satellite = %return_to, "Delegated logout started");
                Outcome::redirect(url)
            }
            Err(e) => {
                error!(error = %e, "Failed to start SAML logout");
                self.ctx.error()
            }
        }
    }

    fn single_log_out_service(&self, req: &SlsRequest) -> Outcome {
        let q = &req.query;
        let result = self.saml.process_slo(&SloMessage {
            saml_response: q.saml_response.clone(),
            saml_request: q.saml_request.clone(),
            raw_query: q.raw_query.clone(),
        });
        if !result.errors.is_empty() {
            error!(
                errors = %result.errors.join(", "),
                reason = result.last_error_reason.as_deref().unwrap_or_default(),
                "SLS endpoint found an error"
            );
        }

        let relay = q.relay_state.as_deref().map(str::trim).unwrap_or_default();
        if relay.is_empty() {
            return self.ctx.error();
        }

        let (host, query) = relay.split_once('?').unwrap_or((relay, ""));
        if !is_valid_host(host) {
            warn!(relay_state = %relay, "SLS RelayState does not name a host");
            return self.ctx.error();
        }

        let token = match self.ctx.tokens.issue(host) {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "Cannot issue logout token");
                return self.ctx.error();
            }
        };

        let mut location = format!("{}?", self.ctx.settings.site().endpoint_url(host, "sls"));
        if !query.is_empty() {
            location.push_str(query);
            location.push('&');
        }
        location.push_str(&format!("token={}", token));

        Outcome::redirect(location)
    }
}
