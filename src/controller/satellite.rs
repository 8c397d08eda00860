//! A satellite site: delegates authentication to the auth host.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::endpoint::{DelegatedAuthEndpoint, HandoffContext};
use super::finalizer::LoginFinalizer;
use super::types::{
    account_path, local_target, login_error_path, AcsForm, Outcome, SloRequest, SlsRequest,
    SsoRequest, HOME_PATH,
};
use crate::directory::{Directory, SessionFlags};
use crate::handoff::HashedIdentifier;

pub struct Satellite {
    ctx: HandoffContext,
    directory: Arc<dyn Directory>,
    flags: Arc<dyn SessionFlags>,
    finalizer: LoginFinalizer,
}

impl Satellite {
    pub fn new(
        ctx: HandoffContext,
        directory: Arc<dyn Directory>,
        flags: Arc<dyn SessionFlags>,
    ) -> Self {
        let finalizer = LoginFinalizer::new(directory.clone(), flags.clone());
        Self {
            ctx,
            directory,
            flags,
            finalizer,
        }
    }

    fn auth_url(&self, endpoint: &str, params: &[(&str, &str)]) -> Option<String> {
        let site = self.ctx.settings.site();
        let query = match serde_urlencoded::to_string(params) {
            Ok(query) => query,
            Err(e) => {
                error!(error = %e, "Failed to encode auth host query");
                return None;
            }
        };
        Some(format!("{}?{}", site.endpoint_url(site.auth_host(), endpoint), query))
    }

    fn login_failed(&self) -> Outcome {
        Outcome::redirect(login_error_path())
    }
}

impl DelegatedAuthEndpoint for Satellite {
    fn single_sign_on(&self, req: &SsoRequest) -> Outcome {
        let site = self.ctx.settings.site();

        if req.current.is_some() {
            let sso_path = site.endpoint_path("sso");
            return Outcome::redirect(
                local_target(req.query.return_to.as_deref(), &sso_path)
                    .unwrap_or_else(|| HOME_PATH.to_string()),
            );
        }

        match self.auth_url("sso", &[("returnTo", site.site_host.as_str())]) {
            Some(url) => {
                debug!(auth_host = %site.auth_host(), "Delegating login to auth host");
                Outcome::redirect(url)
            }
            None => self.ctx.error(),
        }
    }

    fn assertion_consumer_service(&self, form: &AcsForm) -> Outcome {
        let payload = form.handoff_payload.as_deref().unwrap_or_default();
        let token = form.handoff_token.as_deref().unwrap_or_default();
        if payload.is_empty() || token.is_empty() {
            warn!("ACS request without handoff payload or token");
            return self.ctx.error();
        }

        // Day token first; nothing is decrypted or looked up for a rejected post
        let site_host = &self.ctx.settings.site().site_host;
        if !self.ctx.tokens.verify(site_host, token) {
            warn!("Handoff token rejected");
            return self.login_failed();
        }

        let identifier = match self.ctx.codec.decode(payload) {
            Ok(identifier) => identifier,
            Err(e) if e.is_configuration() => {
                error!(error = %e, "Cannot open handoff payload");
                return self.login_failed();
            }
            Err(e) => {
                warn!(error = %e, "Handoff payload rejected");
                return self.login_failed();
            }
        };

        let hash = match self.ctx.cryptor.hash(identifier.personal_code()) {
            Ok(hash) => HashedIdentifier::new(hash),
            Err(e) => {
                error!(error = %e, "Cannot hash personal code");
                return self.login_failed();
            }
        };

        let mut accounts = match self.directory.find_by_hashed_identifier(&hash) {
            Ok(accounts) => accounts,
            Err(e) => {
                error!(error = %e, "Account lookup failed");
                return self.login_failed();
            }
        };
        if accounts.len() != 1 {
            warn!(matches = accounts.len(), "No unique account for handoff identifier");
            return self.login_failed();
        }
        let account = accounts.remove(0);

        match self.finalizer.finalize(&account) {
            Ok(grant) => Outcome::SignedIn {
                location: account_path(&account.id),
                grant,
            },
            Err(e) => {
                error!(account_id = %account.id, error = %e, "Login finalization failed");
                self.ctx.error()
            }
        }
    }

    fn single_log_out(&self, req: &SloRequest) -> Outcome {
        let Some(ref current) = req.current else {
            return Outcome::redirect(HOME_PATH);
        };

        let activated = match self.ctx.settings.module() {
            Ok(module) => module.activate,
            Err(e) => {
                error!(error = %e, "Cannot read module config");
                false
            }
        };
        let delegated = activated
            && self
                .flags
                .is_delegated(&current.account_id)
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Cannot read delegated login flag");
                    false
                });

        if delegated {
            let site_host = &self.ctx.settings.site().site_host;
            let token = match self.ctx.tokens.issue(site_host) {
                Ok(token) => token,
                Err(e) => {
                    error!(error = %e, "Cannot issue logout token");
                    return self.ctx.error();
                }
            };
            let params = [
                ("returnTo", site_host.as_str()),
                ("user", current.account_id.as_str()),
                ("token", token.as_str()),
            ];
            return match self.auth_url("slo", &params) {
                Some(url) => {
                    info!(account_id = %current.account_id, "Delegating logout to auth host");
                    Outcome::redirect(url)
                }
                None => self.ctx.error(),
            };
        }

        match self.directory.logout(current) {
            Ok(()) => Outcome::SignedOut {
                location: HOME_PATH.to_string(),
            },
            Err(e) => {
                error!(account_id = %current.account_id, error = %e, "Local logout failed");
                self.ctx.error()
            }
        }
    }

    fn single_log_out_service(&self, req: &SlsRequest) -> Outcome {
        let site_host = &self.ctx.settings.site().site_host;
        let (Some(user), Some(token)) = (req.query.user.as_deref(), req.query.token.as_deref())
        else {
            return self.ctx.error();
        };
        if !self.ctx.tokens.verify(site_host, token) {
            warn!("Logout token rejected");
            return self.ctx.error();
        }

        if let Err(e) = self.flags.set_delegated(user, false) {
            warn!(account_id = %user, error = %e, "Cannot clear delegated login flag");
        }

        if let Some(ref current) = req.current {
            if let Err(e) = self.directory.logout(current) {
                error!(account_id = %current.account_id, error = %e, "Local logout failed");
            }
        }

        info!(account_id = %user, "Delegated logout completed");
        Outcome::SignedOut {
            location: HOME_PATH.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::auth_host::AuthBroker;
    use crate::controller::testing::{
        account, context, day, settings, user, FakeDirectory, FakeFlags, FakeSaml, AUTH_HOST,
        SITE_HOST,
    };
    use crate::controller::types::{RelayForm, SloQuery, SlsQuery, SsoQuery};
    use crate::crypto::FixedClock;
    use crate::handoff::PersonalIdentifier;
    use crate::saml::ProcessedResponse;
    use crate::settings::ModuleConfig;

    struct Harness {
        satellite: Satellite,
        ctx: HandoffContext,
        directory: Arc<FakeDirectory>,
        flags: Arc<FakeFlags>,
        clock: Arc<FixedClock>,
    }

    fn harness(activate: bool) -> Harness {
        let clock = Arc::new(FixedClock::new(day(14)));
        let module = ModuleConfig {
            activate,
            ..Default::default()
        };
        let ctx = context(settings(SITE_HOST), module, clock.clone());
        let directory = Arc::new(FakeDirectory::default());
        let flags = Arc::new(FakeFlags::default());
        Harness {
            satellite: Satellite::new(ctx.clone(), directory.clone(), flags.clone()),
            ctx,
            directory,
            flags,
            clock,
        }
    }

    impl Harness {
        fn enroll(&self, id: &str, code: &str) {
            let hash = self.ctx.cryptor.hash(code).unwrap();
            self.directory.add(account(id, &hash));
        }

        fn handoff(&self, identifier: &str) -> AcsForm {
            let identifier = PersonalIdentifier::parse(identifier).unwrap();
            AcsForm {
                handoff_payload: Some(self.ctx.codec.encode(&identifier).unwrap().into_inner()),
                handoff_token: Some(self.ctx.tokens.issue(SITE_HOST).unwrap()),
                ..Default::default()
            }
        }
    }

    #[test]
    fn test_sso_delegates_to_auth_host() {
        let h = harness(true);
        let outcome = h.satellite.single_sign_on(&SsoRequest {
            query: SsoQuery::default(),
            current: None,
        });
        assert_eq!(
            outcome,
            Outcome::redirect("https://auth.example.lv/onelogin_saml/sso?returnTo=site.example.lv")
        );
    }

    #[test]
    fn test_sso_authenticated_goes_home() {
        let h = harness(true);
        let outcome = h.satellite.single_sign_on(&SsoRequest {
            query: SsoQuery {
                return_to: Some("https://evil.example".to_string()),
            },
            current: Some(user("42")),
        });
        assert_eq!(outcome, Outcome::redirect("/"));
    }

    #[test]
    fn test_full_login_handoff() {
        let clock = Arc::new(FixedClock::new(day(14)));
        let auth_ctx = context(settings(AUTH_HOST), ModuleConfig::default(), clock.clone());
        let saml = Arc::new(FakeSaml::answering(ProcessedResponse::success("PK:123456-78901")));
        let broker = AuthBroker::new(auth_ctx, saml);

        let sat_ctx = context(settings(SITE_HOST), ModuleConfig::default(), clock);
        let directory = Arc::new(FakeDirectory::default());
        let flags = Arc::new(FakeFlags::default());
        let satellite = Satellite::new(sat_ctx.clone(), directory.clone(), flags.clone());
        directory.add(account("42", &sat_ctx.cryptor.hash("123456-78901").unwrap()));

        let Outcome::Relay(RelayForm { data, token, error, .. }) =
            broker.assertion_consumer_service(&AcsForm {
                saml_response: Some("resp".to_string()),
                relay_state: Some(SITE_HOST.to_string()),
                ..Default::default()
            })
        else {
            panic!("expected relay form");
        };
        assert!(error.is_none());

        let outcome = satellite.assertion_consumer_service(&AcsForm {
            handoff_payload: Some(data),
            handoff_token: Some(token),
            ..Default::default()
        });

        assert_eq!(outcome.location(), Some("/user/42"));
        assert!(matches!(outcome, Outcome::SignedIn { .. }));
        assert_eq!(directory.finalized(), vec!["42".to_string()]);
        assert!(flags.is_delegated("42").unwrap());
    }

    #[test]
    fn test_lookup_hash_strips_prefix() {
        let h = harness(true);
        h.enroll("42", "123456-78901");

        h.satellite
            .assertion_consumer_service(&h.handoff("PK:123456-78901"));
        assert_eq!(
            h.directory.lookups(),
            vec![h.ctx.cryptor.hash("123456-78901").unwrap()]
        );
    }

    #[test]
    fn test_yesterdays_token_is_rejected() {
        let h = harness(true);
        h.enroll("42", "123456-78901");

        h.clock.set(day(13));
        let form = h.handoff("PK:123456-78901");
        h.clock.set(day(14));

        let outcome = h.satellite.assertion_consumer_service(&form);
        assert_eq!(outcome, Outcome::redirect("/user/login?error=1"));
        assert!(h.directory.lookups().is_empty());
        assert!(h.directory.finalized().is_empty());
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let h = harness(true);
        h.enroll("42", "123456-78901");

        let mut form = h.handoff("PK:123456-78901");
        form.handoff_payload = Some("00".repeat(60));

        let outcome = h.satellite.assertion_consumer_service(&form);
        assert_eq!(outcome, Outcome::redirect("/user/login?error=1"));
        assert!(h.directory.lookups().is_empty());
    }

    #[test]
    fn test_unknown_and_ambiguous_accounts() {
        let h = harness(true);

        let outcome = h
            .satellite
            .assertion_consumer_service(&h.handoff("PK:123456-78901"));
        assert_eq!(outcome, Outcome::redirect("/user/login?error=1"));

        h.enroll("1", "123456-78901");
        h.enroll("2", "123456-78901");
        let outcome = h
            .satellite
            .assertion_consumer_service(&h.handoff("PK:123456-78901"));
        assert_eq!(outcome, Outcome::redirect("/user/login?error=1"));
        assert!(h.directory.finalized().is_empty());
    }

    #[test]
    fn test_missing_handoff_fields() {
        let h = harness(true);
        let outcome = h.satellite.assertion_consumer_service(&AcsForm::default());
        assert_eq!(outcome, h.ctx.error());
    }

    #[test]
    fn test_finalizer_failure_is_generic_error() {
        let clock = Arc::new(FixedClock::new(day(14)));
        let ctx = context(settings(SITE_HOST), ModuleConfig::default(), clock);
        let directory = Arc::new(FakeDirectory::failing());
        directory.add(account("42", &ctx.cryptor.hash("123456-78901").unwrap()));
        let satellite = Satellite::new(ctx.clone(), directory, Arc::new(FakeFlags::default()));

        let identifier = PersonalIdentifier::parse("PK:123456-78901").unwrap();
        let outcome = satellite.assertion_consumer_service(&AcsForm {
            handoff_payload: Some(ctx.codec.encode(&identifier).unwrap().into_inner()),
            handoff_token: Some(ctx.tokens.issue(SITE_HOST).unwrap()),
            ..Default::default()
        });
        assert_eq!(outcome, ctx.error());
    }

    #[test]
    fn test_delegated_logout_token_matches_auth_host() {
        let h = harness(true);
        h.flags.set_delegated("42", true).unwrap();

        let outcome = h.satellite.single_log_out(&SloRequest {
            query: SloQuery::default(),
            current: Some(user("42")),
        });
        let location = outcome.location().unwrap().to_string();
        assert!(location.starts_with("https://auth.example.lv/onelogin_saml/slo?"));
        assert!(h.directory.logouts().is_empty());

        let query: SloQuery =
            serde_urlencoded::from_str(location.split_once('?').unwrap().1).unwrap();
        assert_eq!(query.return_to.as_deref(), Some(SITE_HOST));
        assert_eq!(query.user.as_deref(), Some("42"));

        let auth_ctx = context(
            settings(AUTH_HOST),
            ModuleConfig::default(),
            Arc::new(FixedClock::new(day(14))),
        );
        assert!(auth_ctx
            .tokens
            .verify(query.return_to.as_deref().unwrap(), query.token.as_deref().unwrap()));
    }

    #[test]
    fn test_local_logout_without_flag() {
        let h = harness(true);
        let outcome = h.satellite.single_log_out(&SloRequest {
            query: SloQuery::default(),
            current: Some(user("42")),
        });
        assert_eq!(
            outcome,
            Outcome::SignedOut {
                location: "/".to_string()
            }
        );
        assert_eq!(h.directory.logouts(), vec![user("42")]);
    }

    #[test]
    fn test_local_logout_when_not_activated() {
        let h = harness(false);
        h.flags.set_delegated("42", true).unwrap();

        let outcome = h.satellite.single_log_out(&SloRequest {
            query: SloQuery::default(),
            current: Some(user("42")),
        });
        assert!(matches!(outcome, Outcome::SignedOut { .. }));
    }

    #[test]
    fn test_anonymous_logout_goes_home() {
        let h = harness(true);
        let outcome = h.satellite.single_log_out(&SloRequest {
            query: SloQuery::default(),
            current: None,
        });
        assert_eq!(outcome, Outcome::redirect("/"));
    }

    #[test]
    fn test_logout_service_clears_flag() {
        let h = harness(true);
        h.flags.set_delegated("42", true).unwrap();

        let outcome = h.satellite.single_log_out_service(&SlsRequest {
            query: SlsQuery {
                user: Some("42".to_string()),
                token: Some(h.ctx.tokens.issue(SITE_HOST).unwrap()),
                ..Default::default()
            },
            current: Some(user("42")),
        });
        assert!(matches!(outcome, Outcome::SignedOut { .. }));
        assert!(!h.flags.is_delegated("42").unwrap());
        assert_eq!(h.directory.logouts(), vec![user("42")]);
    }

    #[test]
    fn test_logout_service_rejects_bad_token() {
        let h = harness(true);
        h.flags.set_delegated("42", true).unwrap();

        let outcome = h.satellite.single_log_out_service(&SlsRequest {
            query: SlsQuery {
                user: Some("42".to_string()),
                token: Some("forged".to_string()),
                ..Default::default()
            },
            current: Some(user("42")),
        });
        assert_eq!(outcome, h.ctx.error());
        assert!(h.flags.is_delegated("42").unwrap());
        assert!(h.directory.logouts().is_empty());
    }
}
