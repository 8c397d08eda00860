//! Request handlers.

use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Path, Query, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use tracing::{error, warn};

use super::render::{self, escape, outcome_response, page};
use super::state::AppState;
use crate::controller::{
    AcsForm, Outcome, ProtocolRequest, SloQuery, SloRequest, SlsQuery, SlsRequest, SsoQuery,
    SsoRequest, HOME_PATH, LOGIN_PATH,
};

fn respond(state: &AppState, request: ProtocolRequest) -> Response {
    let outcome = request.dispatch(state.endpoint.as_ref());
    outcome_response(outcome, state.settings.site().locale, &state.session_config)
}

/// Unreadable query or form: the generic error page, like any other failure.
fn rejected(state: &AppState, rejection: impl std::fmt::Display) -> Response {
    warn!(error = %rejection, "Malformed request");
    let locale = state.settings.site().locale;
    Html(render::error_page(locale, locale.generic_error())).into_response()
}

fn forbidden(state: &AppState) -> Response {
    let locale = state.settings.site().locale;
    let body = page(locale, "403", "<p>Access denied.</p>");
    (StatusCode::FORBIDDEN, Html(body)).into_response()
}

fn not_found(state: &AppState) -> Response {
    let locale = state.settings.site().locale;
    let body = page(locale, "404", "<p>Not found.</p>");
    (StatusCode::NOT_FOUND, Html(body)).into_response()
}

pub async fn sso(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<SsoQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return rejected(&state, rejection),
    };
    let current = state.current_user(&headers);
    respond(&state, ProtocolRequest::SingleSignOn(SsoRequest { query, current }))
}

pub async fn acs(
    State(state): State<AppState>,
    form: Result<Form<AcsForm>, FormRejection>,
) -> Response {
    match form {
        Ok(Form(form)) => respond(&state, ProtocolRequest::AssertionConsumer(form)),
        Err(rejection) => rejected(&state, rejection),
    }
}

pub async fn slo(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<SloQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return rejected(&state, rejection),
    };
    let current = state.current_user(&headers);
    respond(&state, ProtocolRequest::SingleLogOut(SloRequest { query, current }))
}

pub async fn sls(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    query: Result<Query<SlsQuery>, QueryRejection>,
) -> Response {
    let mut query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return rejected(&state, rejection),
    };
    query.raw_query = raw_query;
    let current = state.current_user(&headers);
    respond(&state, ProtocolRequest::SingleLogOutService(SlsRequest { query, current }))
}

pub async fn home(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let locale = state.settings.site().locale;
    let body = match state.current_user(&headers) {
        Some(user) => {
            let name = match state.accounts.get(&user.account_id) {
                Ok(Some(account)) => account.display_name,
                _ => user.account_id.clone(),
            };
            format!(
                "<p><a href=\"/user/{}\">{}</a> | <a href=\"/user/logout\">Logout</a></p>",
                escape(&user.account_id),
                escape(&name)
            )
        }
        None => format!("<p><a href=\"{}\">Login</a></p>", LOGIN_PATH),
    };
    Html(page(locale, &state.settings.site().site_host, &body)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub error: Option<String>,
}

pub async fn login_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<LoginQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return rejected(&state, rejection),
    };
    let site = state.settings.site();
    if site.is_auth_host() {
        return forbidden(&state);
    }
    if state.current_user(&headers).is_some() {
        return render::redirect(HOME_PATH, None);
    }

    let mut body = String::new();
    if query.error.is_some() {
        body.push_str(&format!(
            "<div class=\"messages error\" role=\"alert\">{}</div>\n",
            escape(site.locale.generic_error())
        ));
    }
    body.push_str(&format!(
        "<p><a href=\"{}\">latvija.lv</a></p>",
        escape(&site.endpoint_path("sso"))
    ));

    Html(page(site.locale, "Login", &body)).into_response()
}

pub async fn register(State(state): State<AppState>) -> Response {
    if state.settings.site().is_auth_host() {
        return forbidden(&state);
    }
    not_found(&state)
}

pub async fn password(State(state): State<AppState>) -> Response {
    if state.settings.site().is_auth_host() {
        return forbidden(&state);
    }
    match state.settings.module() {
        Ok(module) if module.disable_default_login || module.disable_set_local_password => {
            forbidden(&state)
        }
        Ok(_) => not_found(&state),
        Err(e) => {
            error!(error = %e, "Cannot read module config");
            forbidden(&state)
        }
    }
}

/// Local logout, routed through SLO when delegated authentication is active.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let site = state.settings.site();
    let activated = state.settings.module().map(|m| m.activate).unwrap_or(false);
    if activated && !site.is_auth_host() {
        return render::redirect(&site.endpoint_path("slo"), None);
    }

    if let Some(current) = state.current_user(&headers) {
        if let Err(e) = state.directory.logout(&current) {
            warn!(account_id = %current.account_id, error = %e, "Local logout failed");
        }
    }

    outcome_response(
        Outcome::SignedOut {
            location: HOME_PATH.to_string(),
        },
        site.locale,
        &state.session_config,
    )
}

/// Canonical account page.
pub async fn account_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let Some(current) = state.current_user(&headers) else {
        return render::redirect(LOGIN_PATH, None);
    };
    if current.account_id != id {
        return forbidden(&state);
    }

    match state.accounts.get(&id) {
        Ok(Some(account)) => {
            let body = format!(
                "<h1>{}</h1>\n<p><a href=\"/user/logout\">Logout</a></p>",
                escape(&account.display_name)
            );
            Html(page(state.settings.site().locale, &account.display_name, &body)).into_response()
        }
        Ok(None) => not_found(&state),
        Err(e) => {
            error!(account_id = %id, error = %e, "Account lookup failed");
            let locale = state.settings.site().locale;
            let body = render::error_page(locale, locale.generic_error());
            (StatusCode::INTERNAL_SERVER_ERROR, Html(body)).into_response()
        }
    }
}
