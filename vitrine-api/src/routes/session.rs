//! Session introspection and sign-out.
//!
//! `GET /api/auth/session` is what `SessionResolver` calls. It must stay
//! outside `session_middleware`, or every resolution would recurse.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use vitrine_cache::ResponseCache;

use crate::auth::{expired_session_cookie, read_cookie, verify_session_token, SessionConfig};
use crate::state::AppState;
use crate::types::SessionResponse;

/// GET /api/auth/session
///
/// Always `200`: `{ "user": {...} }` for a valid session token and
/// `{ "user": null }` otherwise.
pub async fn introspect(
    State(config): State<Arc<SessionConfig>>,
    headers: HeaderMap,
) -> Json<SessionResponse> {
    let Some(token) = read_cookie(&headers, &config.cookie_name) else {
        return Json(SessionResponse::anonymous());
    };

    match verify_session_token(&config, &token) {
        Ok(claims) => Json(SessionResponse::for_user(claims.into_user())),
        Err(e) => {
            tracing::debug!(code = %e.code, "Session token rejected");
            Json(SessionResponse::anonymous())
        }
    }
}

/// POST /api/auth/signout
///
/// Expires the session cookie and drops every cached response.
pub async fn signout(
    State(config): State<Arc<SessionConfig>>,
    State(cache): State<ResponseCache>,
) -> impl IntoResponse {
    cache.invalidate_all();
    tracing::info!("Signed out; response cache cleared");
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, expired_session_cookie(&config))],
    )
}

/// Routes under `/api/auth`. Never layer `session_middleware` on these.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/session", get(introspect))
        .route("/signout", post(signout))
}
