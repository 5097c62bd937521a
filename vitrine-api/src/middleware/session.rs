//! Session middleware and identity extractors.
//!
//! `session_middleware` resolves the caller's identity once per request and
//! injects it into request extensions. Handlers then state their access
//! requirement in their signature:
//!
//! | extractor         | anonymous | no role | staff | admin |
//! |-------------------|-----------|---------|-------|-------|
//! | `CurrentIdentity` | ok        | ok      | ok    | ok    |
//! | `RequireUser`     | 401       | ok      | ok    | ok    |
//! | `RequireStaff`    | 401       | 403     | ok    | ok    |
//! | `RequireAdmin`    | 401       | 403     | 403   | ok    |

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use vitrine_core::{Role, SessionIdentity};

use crate::error::ApiError;
use crate::session::ResolveSession;

/// Where page routes send anonymous visitors.
pub const UNAUTHORIZED_PAGE: &str = "/unauthorized";

// ============================================================================
// MIDDLEWARE
// ============================================================================

/// Resolve the session and store the identity in request extensions.
///
/// Never rejects a request; anonymous is a valid identity at this layer.
pub async fn session_middleware(
    State(resolver): State<Arc<dyn ResolveSession>>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = resolver.resolve(request.headers()).await;
    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Page guard: redirect anonymous visitors to [`UNAUTHORIZED_PAGE`].
///
/// Must run after `session_middleware`.
pub async fn require_page_session(request: Request, next: Next) -> Response {
    let authenticated = request
        .extensions()
        .get::<SessionIdentity>()
        .is_some_and(SessionIdentity::is_authenticated);

    if !authenticated {
        tracing::debug!(path = %request.uri().path(), "Redirecting anonymous visitor");
        return Redirect::to(UNAUTHORIZED_PAGE).into_response();
    }
    next.run(request).await
}

// ============================================================================
// EXTRACTORS
// ============================================================================

fn identity_from_parts(parts: &Parts) -> Result<SessionIdentity, ApiError> {
    parts
        .extensions
        .get::<SessionIdentity>()
        .cloned()
        .ok_or_else(|| {
            ApiError::internal_error(
                "SessionIdentity not found in request extensions. \
                 Ensure session_middleware is applied to this route.",
            )
        })
}

/// The caller's identity, anonymous or not.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub SessionIdentity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_parts(parts).map(CurrentIdentity)
    }
}

/// An authenticated caller; anonymous requests get `401`.
#[derive(Debug, Clone)]
pub struct RequireUser(pub SessionIdentity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = identity_from_parts(parts)?;
        if identity.is_anonymous() {
            return Err(ApiError::unauthorized("Authentication required"));
        }
        Ok(RequireUser(identity))
    }
}

/// A caller holding either dashboard role.
#[derive(Debug, Clone)]
pub struct RequireStaff(pub SessionIdentity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequireStaff
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireUser(identity) = RequireUser::from_request_parts(parts, state).await?;
        if !identity.is_staff_or_admin() {
            return Err(ApiError::forbidden("Staff or admin role required"));
        }
        Ok(RequireStaff(identity))
    }
}

/// A caller holding the admin role.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub SessionIdentity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireUser(identity) = RequireUser::from_request_parts(parts, state).await?;
        if !identity.has_role(Role::Admin) {
            return Err(ApiError::forbidden("Admin role required"));
        }
        Ok(RequireAdmin(identity))
    }
}

impl std::ops::Deref for CurrentIdentity {
    type Target = SessionIdentity;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::Deref for RequireUser {
    type Target = SessionIdentity;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// TESTS
// ============================================================================
