//! HTML pages and the mapping from outcomes to responses.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};

use crate::controller::{Outcome, RelayForm};
use crate::session::SessionConfig;
use crate::settings::Locale;

const NO_CACHE: &str = "no-store, no-cache, must-revalidate, max-age=0";

/// Escape text for HTML element content and quoted attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wrap a body fragment in a complete document.
pub fn page(locale: Locale, title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"{}\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        locale.tag(),
        escape(title),
        body
    )
}

/// Auto-submitting handoff form, or the generic error when the exchange failed.
pub fn relay_page(locale: Locale, form: &RelayForm) -> String {
    if let Some(error) = form.error {
        return error_page(locale, error);
    }

    let body = format!(
        concat!(
            "<form id=\"handoff\" method=\"post\" action=\"{action}\">\n",
            "<input type=\"hidden\" name=\"TVPAuthResponse\" value=\"{data}\">\n",
            "<input type=\"hidden\" name=\"TVPToken\" value=\"{token}\">\n",
            "<noscript><button type=\"submit\">OK</button></noscript>\n",
            "</form>\n",
            "<script>document.getElementById('handoff').submit();</script>"
        ),
        action = escape(&form.action),
        data = escape(&form.data),
        token = escape(&form.token),
    );
    page(locale, "latvija.lv", &body)
}

pub fn error_page(locale: Locale, message: &str) -> String {
    let body = format!(
        "<div class=\"messages error\" role=\"alert\">{}</div>\n<p><a href=\"/\">latvija.lv</a></p>",
        escape(message)
    );
    page(locale, "latvija.lv", &body)
}

/// Build the response for a controller outcome.
pub fn outcome_response(outcome: Outcome, locale: Locale, sessions: &SessionConfig) -> Response {
    match outcome {
        Outcome::Redirect { location } => redirect(&location, None),
        Outcome::SignedIn { location, grant } => {
            redirect(&location, Some(sessions.build_cookie(&grant.session_id.to_hex())))
        }
        Outcome::SignedOut { location } => redirect(&location, Some(sessions.clear_cookie())),
        Outcome::Relay(form) => Html(relay_page(locale, &form)).into_response(),
        Outcome::Error { message } => Html(error_page(locale, message)).into_response(),
    }
}

pub fn redirect(location: &str, cookie: Option<String>) -> Response {
    let Ok(location) = HeaderValue::from_str(location) else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let mut response = (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
    if let Some(value) = cookie.and_then(|c| HeaderValue::from_str(&c).ok()) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

/// Disable caching of protocol responses; they carry one-time secrets.
pub async fn no_cache(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    response
}
