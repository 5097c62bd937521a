//! Session Resolution
//!
//! `SessionResolver` turns an incoming request's cookies into a
//! [`SessionIdentity`] by forwarding them to the introspection endpoint.
//! It fails closed: a missing cookie, a transport error, a timeout, a
//! non-success status, and an unparseable body all produce the anonymous
//! identity. The distinct reason is logged and counted, never returned.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{header, HeaderMap};
use thiserror::Error;
use vitrine_core::{SessionEnvelope, SessionIdentity};

use crate::auth::SessionConfig;
use crate::error::{ApiError, ApiResult};
use crate::telemetry::METRICS;

// ============================================================================
// RESOLUTION OUTCOME
// ============================================================================

/// Why a request resolved to the anonymous identity.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnonymousReason {
    #[error("request carried no session cookie")]
    NoCookie,

    #[error("introspection reported no user")]
    NoUser,

    #[error("introspection request failed: {0}")]
    Transport(String),

    #[error("introspection timed out")]
    Timeout,

    #[error("introspection returned status {0}")]
    Status(u16),

    #[error("introspection body was malformed: {0}")]
    Malformed(String),
}

impl AnonymousReason {
    /// Metric label for this reason.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoCookie => "no_cookie",
            Self::NoUser => "no_user",
            Self::Transport(_) => "transport_error",
            Self::Timeout => "timeout",
            Self::Status(_) => "bad_status",
            Self::Malformed(_) => "malformed",
        }
    }

    /// Whether this reason points at a fault rather than a signed-out user.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::NoCookie | Self::NoUser)
    }
}

/// Detailed outcome of one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Authenticated(SessionIdentity),
    Anonymous(AnonymousReason),
}

impl Resolution {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Authenticated(_) => "authenticated",
            Self::Anonymous(reason) => reason.label(),
        }
    }

    /// Collapse to the identity callers see.
    pub fn into_identity(self) -> SessionIdentity {
        match self {
            Self::Authenticated(identity) => identity,
            Self::Anonymous(_) => SessionIdentity::anonymous(),
        }
    }
}

// ============================================================================
// RESOLVER SEAM
// ============================================================================

/// Source of the caller's identity for a request.
#[async_trait::async_trait]
pub trait ResolveSession: Send + Sync {
    /// Resolve the identity for a request with the given headers.
    ///
    /// Never fails; any problem yields the anonymous identity.
    async fn resolve(&self, headers: &HeaderMap) -> SessionIdentity;
}

/// All `Cookie` headers of a request joined into one header value.
pub fn cookie_header(headers: &HeaderMap) -> Option<String> {
    let parts: Vec<&str> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

// ============================================================================
// HTTP RESOLVER
// ============================================================================

/// Resolves sessions through the introspection endpoint over HTTP.
#[derive(Clone)]
pub struct SessionResolver {
    client: reqwest::Client,
    config: Arc<SessionConfig>,
}

impl std::fmt::Debug for SessionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionResolver")
            .field("introspection_url", &self.config.introspection_url)
            .finish()
    }
}

impl SessionResolver {
    pub fn new(config: Arc<SessionConfig>) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.introspection_timeout)
            .build()
            .map_err(|e| {
                ApiError::internal_error(format!("Failed to build introspection client: {}", e))
            })?;
        Ok(Self { client, config })
    }

    /// Resolve from a raw `Cookie` header value.
    pub async fn resolve_cookie(&self, cookie_header: Option<&str>) -> SessionIdentity {
        let resolution = self.resolve_detailed(cookie_header).await;

        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_session_resolution(resolution.label());
        }
        match &resolution {
            Resolution::Authenticated(identity) => {
                tracing::debug!(user_id = ?identity.user_id, role = ?identity.role, "Session resolved");
            }
            Resolution::Anonymous(reason) if reason.is_failure() => {
                tracing::warn!(reason = %reason, outcome = reason.label(), "Session introspection failed, treating request as anonymous");
            }
            Resolution::Anonymous(reason) => {
                tracing::trace!(outcome = reason.label(), "Anonymous request");
            }
        }

        resolution.into_identity()
    }

    /// Resolve and report why the result is anonymous, if it is.
    pub async fn resolve_detailed(&self, cookie_header: Option<&str>) -> Resolution {
        let Some(cookie) = cookie_header.filter(|c| self.carries_session_cookie(c)) else {
            return Resolution::Anonymous(AnonymousReason::NoCookie);
        };

        let response = match self
            .client
            .get(&self.config.introspection_url)
            .header(header::COOKIE, cookie)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Resolution::Anonymous(AnonymousReason::Timeout),
            Err(e) => return Resolution::Anonymous(AnonymousReason::Transport(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            return Resolution::Anonymous(AnonymousReason::Status(status.as_u16()));
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => return Resolution::Anonymous(AnonymousReason::Timeout),
            Err(e) => return Resolution::Anonymous(AnonymousReason::Transport(e.to_string())),
        };

        let envelope: SessionEnvelope = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(e) => return Resolution::Anonymous(AnonymousReason::Malformed(e.to_string())),
        };

        match envelope.user {
            None => Resolution::Anonymous(AnonymousReason::NoUser),
            Some(user) if user.id.trim().is_empty() => Resolution::Anonymous(
                AnonymousReason::Malformed("user without id".to_string()),
            ),
            Some(user) => Resolution::Authenticated(SessionIdentity::from_user(user)),
        }
    }

    fn carries_session_cookie(&self, cookie_header: &str) -> bool {
        cookie_header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .any(|(key, value)| key == self.config.cookie_name && !value.trim().is_empty())
    }
}

#[async_trait::async_trait]
impl ResolveSession for SessionResolver {
    async fn resolve(&self, headers: &HeaderMap) -> SessionIdentity {
        self.resolve_cookie(cookie_header(headers).as_deref()).await
    }
}

// ============================================================================
// STATIC RESOLVER
// ============================================================================

/// Resolver backed by a fixed token → identity table.
///
/// Used where no introspection endpoint is reachable, such as router tests.
/// Unknown or missing tokens resolve to anonymous.
#[derive(Debug, Clone, Default)]
pub struct StaticSessionResolver {
    cookie_name: String,
    sessions: HashMap<String, SessionIdentity>,
}

impl StaticSessionResolver {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            sessions: HashMap::new(),
        }
    }

    pub fn with_session(mut self, token: impl Into<String>, identity: SessionIdentity) -> Self {
        self.sessions.insert(token.into(), identity);
        self
    }
}

#[async_trait::async_trait]
impl ResolveSession for StaticSessionResolver {
    async fn resolve(&self, headers: &HeaderMap) -> SessionIdentity {
        crate::auth::read_cookie(headers, &self.cookie_name)
            .and_then(|token| self.sessions.get(&token).cloned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use vitrine_core::{Role, SessionUser};

    fn resolver(url: &str) -> SessionResolver {
        let config = SessionConfig::default().with_introspection_url(url);
        SessionResolver::new(Arc::new(config)).expect("client should build")
    }

    #[tokio::test]
    async fn test_no_cookie_header_skips_round_trip() {
        // Nothing listens on port 9; a round trip would be a transport error.
        let resolver = resolver("http://127.0.0.1:9/api/auth/session");
        assert_eq!(
            resolver.resolve_detailed(None).await,
            Resolution::Anonymous(AnonymousReason::NoCookie)
        );
    }

    #[tokio::test]
    async fn test_unrelated_cookies_skip_round_trip() {
        let resolver = resolver("http://127.0.0.1:9/api/auth/session");
        assert_eq!(
            resolver.resolve_detailed(Some("theme=dark; vitrine.session-token=")).await,
            Resolution::Anonymous(AnonymousReason::NoCookie)
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_anonymous() {
        let resolver = resolver("http://127.0.0.1:9/api/auth/session");
        let resolution = resolver
            .resolve_detailed(Some("vitrine.session-token=abc"))
            .await;
        assert!(matches!(
            resolution,
            Resolution::Anonymous(AnonymousReason::Transport(_))
        ));
        assert!(resolution.into_identity().is_anonymous());
    }

    #[test]
    fn test_cookie_header_joins_multiple_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("b=2"));
        assert_eq!(cookie_header(&headers).as_deref(), Some("a=1; b=2"));
        assert_eq!(cookie_header(&HeaderMap::new()), None);
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(AnonymousReason::Status(500).label(), "bad_status");
        assert!(AnonymousReason::Timeout.is_failure());
        assert!(!AnonymousReason::NoUser.is_failure());
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let admin = SessionIdentity::from_user(SessionUser {
            id: "u1".to_string(),
            role: Some("ADMIN".to_string()),
            ..Default::default()
        });
        let resolver = StaticSessionResolver::new("sid").with_session("tok", admin);

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("sid=tok"));
        assert!(resolver.resolve(&headers).await.has_role(Role::Admin));

        headers.insert(header::COOKIE, HeaderValue::from_static("sid=other"));
        assert!(resolver.resolve(&headers).await.is_anonymous());
    }
}
