//! Server-rendered pages.
//!
//! Bodies are placeholders; only access control is meaningful here.

use axum::{
    http::StatusCode,
    middleware::from_fn,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};

use crate::middleware::{require_page_session, CurrentIdentity};
use crate::state::AppState;

pub async fn landing() -> Html<&'static str> {
    Html("<h1>Vitrine</h1>")
}

pub async fn unauthorized() -> Html<&'static str> {
    Html("<h1>Sign in required</h1><p>Your session is missing or has expired.</p>")
}

/// GET /admin
///
/// Anonymous visitors are redirected by the page guard; signed-in users
/// without a dashboard role get `403`.
pub async fn admin(CurrentIdentity(identity): CurrentIdentity) -> Response {
    if !identity.is_staff_or_admin() {
        return (StatusCode::FORBIDDEN, Html("<h1>Forbidden</h1>")).into_response();
    }
    let name = identity.name().unwrap_or("admin");
    Html(format!("<h1>Dashboard</h1><p>Signed in as {}</p>", escape(name))).into_response()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Pages open to everyone.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(landing))
        .route("/unauthorized", get(unauthorized))
}

/// Guarded pages. Requires `session_middleware`.
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/admin", get(admin))
        .layer(from_fn(require_page_session))
}
