//! HTTP surface: protocol endpoints plus the local account routes.

pub mod handlers;
pub mod render;
pub mod state;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the router for this site's role.
///
/// | Method   | Path             | Handler        |
/// |----------|------------------|----------------|
/// | GET      | `{base}/sso`     | `sso`          |
/// | POST     | `{base}/acs`     | `acs`          |
/// | GET/POST | `{base}/slo`     | `slo`          |
/// | GET      | `{base}/sls`     | `sls`          |
/// | GET      | `/user/login`    | `login_page`   |
/// | GET      | `/user/logout`   | `logout`       |
/// | GET      | `/user/:id`      | `account_page` |
///
/// Protocol responses are never cacheable.
pub fn router(state: AppState) -> Router {
    let site = state.settings.site();

    let protocol = Router::new()
        .route(&site.endpoint_path("sso"), get(handlers::sso))
        .route(&site.endpoint_path("acs"), post(handlers::acs))
        .route(
            &site.endpoint_path("slo"),
            get(handlers::slo).post(handlers::slo),
        )
        .route(&site.endpoint_path("sls"), get(handlers::sls))
        .layer(middleware::map_response(render::no_cache));

    let local = Router::new()
        .route("/", get(handlers::home))
        .route("/user/login", get(handlers::login_page))
        .route("/user/register", get(handlers::register))
        .route("/user/password", get(handlers::password))
        .route("/user/logout", get(handlers::logout))
        .route("/user/:id", get(handlers::account_page));

    protocol
        .merge(local)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
