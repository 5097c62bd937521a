//! Session Token Module
//!
//! The session cookie carries an HS256 JWT. This module owns:
//! - `SessionConfig`: cookie name, introspection endpoint, signing secret
//! - `SessionClaims`: the token body, mirroring the introspected user shape
//! - `verify_session_token` / `issue_session_token`
//! - Cookie header parsing and `Set-Cookie` construction
//!
//! Only the introspection endpoint verifies tokens. Every other route learns
//! the caller's identity through `SessionResolver`.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use vitrine_core::{ConfigError, SessionUser, VitrineError};

use crate::error::{ApiError, ApiResult};

/// Default session cookie name.
pub const DEFAULT_SESSION_COOKIE: &str = "vitrine.session-token";

const INSECURE_DEFAULT_SECRET: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

// ============================================================================
// CLOCK ABSTRACTION
// ============================================================================

/// Clock used for token time checks, injectable for deterministic tests.
pub trait SessionClock: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SessionClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl SessionClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

// ============================================================================
// SESSION SECRET
// ============================================================================

/// Signing secret for session tokens. Never printed.
#[derive(Clone)]
pub struct SessionSecret(SecretString);

impl SessionSecret {
    /// # Errors
    /// Returns error if the secret is empty.
    pub fn new(secret: String) -> Result<Self, VitrineError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "session_secret".to_string(),
            }
            .into());
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value (only for cryptographic operations).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT_SECRET
    }

    fn insecure_default() -> Self {
        Self(SecretString::new(INSECURE_DEFAULT_SECRET.into()))
    }
}

impl std::fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Session configuration.
#[derive(Clone)]
pub struct SessionConfig {
    /// Name of the cookie holding the session token.
    pub cookie_name: String,

    /// Absolute URL of the introspection endpoint.
    pub introspection_url: String,

    /// Upper bound on one introspection round trip.
    pub introspection_timeout: Duration,

    /// HS256 signing secret.
    pub secret: SessionSecret,

    /// Lifetime of issued tokens, in seconds.
    pub token_ttl_secs: i64,

    /// Clock skew tolerance for `exp`/`nbf`, in seconds.
    pub clock_skew_secs: i64,

    /// Add `Secure` to the session cookie.
    pub secure_cookie: bool,

    pub clock: Arc<dyn SessionClock>,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("cookie_name", &self.cookie_name)
            .field("introspection_url", &self.introspection_url)
            .field("introspection_timeout", &self.introspection_timeout)
            .field("secret", &self.secret)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("clock_skew_secs", &self.clock_skew_secs)
            .field("secure_cookie", &self.secure_cookie)
            .finish()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            introspection_url: default_introspection_url(3000),
            introspection_timeout: Duration::from_secs(5),
            secret: SessionSecret::insecure_default(),
            token_ttl_secs: 30 * 24 * 3600,
            clock_skew_secs: 60,
            secure_cookie: false,
            clock: Arc::new(SystemClock),
        }
    }
}

/// Introspection URL of a server listening locally on `port`.
pub fn default_introspection_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api/auth/session", port)
}

impl SessionConfig {
    /// Create session configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `VITRINE_SESSION_COOKIE`: Cookie name (default: `vitrine.session-token`)
    /// - `VITRINE_INTROSPECTION_URL`: Introspection endpoint (default: this server on `local_port`)
    /// - `VITRINE_INTROSPECTION_TIMEOUT_MS`: Round-trip bound (default: 5000)
    /// - `VITRINE_SESSION_SECRET`: Token signing secret
    /// - `VITRINE_SESSION_TTL_SECS`: Issued token lifetime (default: 30 days)
    /// - `VITRINE_SESSION_CLOCK_SKEW_SECS`: Clock skew tolerance (default: 60)
    /// - `VITRINE_SESSION_SECURE_COOKIE`: "true" adds `Secure` (default: false)
    pub fn from_env(local_port: u16) -> Self {
        let defaults = Self::default();

        let secret = std::env::var("VITRINE_SESSION_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| SessionSecret::new(s).ok())
            .unwrap_or_else(SessionSecret::insecure_default);

        Self {
            cookie_name: std::env::var("VITRINE_SESSION_COOKIE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.cookie_name),
            introspection_url: std::env::var("VITRINE_INTROSPECTION_URL")
                .unwrap_or_else(|_| default_introspection_url(local_port)),
            introspection_timeout: std::env::var("VITRINE_INTROSPECTION_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.introspection_timeout),
            secret,
            token_ttl_secs: std::env::var("VITRINE_SESSION_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.token_ttl_secs),
            clock_skew_secs: std::env::var("VITRINE_SESSION_CLOCK_SKEW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.clock_skew_secs),
            secure_cookie: std::env::var("VITRINE_SESSION_SECURE_COOKIE")
                .map(|s| s.to_lowercase() == "true")
                .unwrap_or(false),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_secret(mut self, secret: SessionSecret) -> Self {
        self.secret = secret;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn SessionClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_introspection_url(mut self, url: impl Into<String>) -> Self {
        self.introspection_url = url.into();
        self
    }

    /// Refuse an insecure secret in production; warn in development.
    pub fn validate_for_production(&self, is_production: bool) -> ApiResult<()> {
        if self.secret.is_insecure_default() {
            if is_production {
                return Err(ApiError::invalid_input(
                    "Cannot start in production with the default session secret. \
                     Set VITRINE_SESSION_SECRET.",
                ));
            }
            tracing::warn!(
                "Using the default session secret. Set VITRINE_SESSION_SECRET \
                 before deploying."
            );
        } else if self.secret.len() < 32 {
            if is_production {
                return Err(ApiError::invalid_input(format!(
                    "Session secret is too short for production use ({} chars). \
                     It must be at least 32 characters long.",
                    self.secret.len()
                )));
            }
            tracing::warn!(
                length = self.secret.len(),
                "Session secret is shorter than 32 characters"
            );
        }

        if is_production && !self.secure_cookie {
            tracing::warn!("Session cookie is sent without the Secure attribute");
        }
        Ok(())
    }
}

// ============================================================================
// SESSION CLAIMS
// ============================================================================

/// Body of a session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user id)
    pub sub: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl SessionClaims {
    pub fn new(user: &SessionUser, ttl_secs: i64, clock: &dyn SessionClock) -> Self {
        let now = clock.now_epoch_secs();
        Self {
            sub: user.id.clone(),
            iat: now,
            exp: now + ttl_secs,
            name: user.name.clone(),
            email: user.email.clone(),
            image: user.image.clone(),
            role: user.role.clone(),
        }
    }

    /// The user this token was issued for.
    pub fn into_user(self) -> SessionUser {
        SessionUser {
            id: self.sub,
            name: self.name,
            email: self.email,
            image: self.image,
            role: self.role,
        }
    }
}

// ============================================================================
// TOKEN OPERATIONS
// ============================================================================

fn validate_claim_times(now: i64, claims: &SessionClaims, leeway_secs: i64) -> ApiResult<()> {
    if now + leeway_secs < claims.iat {
        return Err(ApiError::invalid_token("Token issued in the future"));
    }
    if claims.exp < now - leeway_secs {
        return Err(ApiError::token_expired());
    }
    Ok(())
}

/// Verify a session token's signature and lifetime.
///
/// Signature checking is delegated to `jsonwebtoken`; time checks use the
/// configured clock so tests can pin the current time.
pub fn verify_session_token(config: &SessionConfig, token: &str) -> ApiResult<SessionClaims> {
    let decoding_key = DecodingKey::from_secret(config.secret.expose().as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims = std::collections::HashSet::from(["exp".to_string()]);

    let claims = decode::<SessionClaims>(token, &decoding_key, &validation)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                ApiError::invalid_token("Token signature is invalid")
            }
            _ => ApiError::invalid_token(format!("Token validation failed: {}", e)),
        })?
        .claims;

    let now = config.clock.now_epoch_secs();
    if now < 0 {
        tracing::error!(timestamp = now, "System clock returned pre-epoch time");
        return Err(ApiError::internal_error("Server time configuration error"));
    }

    validate_claim_times(now, &claims, config.clock_skew_secs)?;

    if claims.sub.trim().is_empty() {
        return Err(ApiError::invalid_token("Token has no subject"));
    }
    Ok(claims)
}

/// Sign a session token for `user`.
pub fn issue_session_token(config: &SessionConfig, user: &SessionUser) -> ApiResult<String> {
    let claims = SessionClaims::new(user, config.token_ttl_secs, &*config.clock);
    let encoding_key = EncodingKey::from_secret(config.secret.expose().as_bytes());

    encode(&Header::new(Algorithm::HS256), &claims, &encoding_key)
        .map_err(|e| ApiError::internal_error(format!("Failed to issue session token: {}", e)))
}

// ============================================================================
// COOKIES
// ============================================================================

/// Value of cookie `name` from the request's `Cookie` headers.
///
/// Empty values are treated as absent.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value that removes the session cookie.
pub fn expired_session_cookie(config: &SessionConfig) -> String {
    let mut cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        config.cookie_name
    );
    if config.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    /// 2024-01-01 00:00:00 UTC
    const NOW: i64 = 1704067200;

    fn test_config() -> SessionConfig {
        SessionConfig::default()
            .with_secret(
                SessionSecret::new("test-secret-that-is-long-enough-for-hs256".to_string())
                    .expect("test secret should be valid"),
            )
            .with_clock(Arc::new(FixedClock(NOW)))
    }

    fn alice() -> SessionUser {
        SessionUser {
            id: "user-alice".to_string(),
            name: Some("Alice".to_string()),
            email: Some("alice@vitrine.test".to_string()),
            image: None,
            role: Some("ADMIN".to_string()),
        }
    }

    #[test]
    fn test_issue_and_verify() -> ApiResult<()> {
        let config = test_config();
        let token = issue_session_token(&config, &alice())?;
        let claims = verify_session_token(&config, &token)?;

        assert_eq!(claims.sub, "user-alice");
        assert_eq!(claims.role.as_deref(), Some("ADMIN"));
        assert_eq!(claims.into_user(), alice());
        Ok(())
    }

    #[test]
    fn test_wrong_secret_rejected() -> ApiResult<()> {
        let config = test_config();
        let token = issue_session_token(&config, &alice())?;

        let other = test_config().with_secret(
            SessionSecret::new("a-completely-different-secret-value".to_string())
                .expect("test secret should be valid"),
        );
        let err = verify_session_token(&other, &token).expect_err("signature must not verify");
        assert_eq!(err.code, crate::error::ErrorCode::InvalidToken);
        Ok(())
    }

    #[test]
    fn test_expired_token_rejected() -> ApiResult<()> {
        let config = test_config();
        let token = issue_session_token(&config, &alice())?;

        let later = test_config().with_clock(Arc::new(FixedClock(
            NOW + config.token_ttl_secs + config.clock_skew_secs + 1,
        )));
        let err = verify_session_token(&later, &token).expect_err("token must be expired");
        assert_eq!(err.code, crate::error::ErrorCode::TokenExpired);
        Ok(())
    }

    #[test]
    fn test_expiry_within_skew_accepted() -> ApiResult<()> {
        let config = test_config();
        let token = issue_session_token(&config, &alice())?;

        let slightly_late = test_config().with_clock(Arc::new(FixedClock(
            NOW + config.token_ttl_secs + config.clock_skew_secs - 1,
        )));
        assert!(verify_session_token(&slightly_late, &token).is_ok());
        Ok(())
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(verify_session_token(&test_config(), "not-a-jwt").is_err());
    }

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; vitrine.session-token=abc.def.ghi; other=1"),
        );
        assert_eq!(
            read_cookie(&headers, DEFAULT_SESSION_COOKIE).as_deref(),
            Some("abc.def.ghi")
        );
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_read_cookie_empty_value_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("vitrine.session-token="),
        );
        assert_eq!(read_cookie(&headers, DEFAULT_SESSION_COOKIE), None);
    }

    #[test]
    fn test_expired_session_cookie_attributes() {
        let mut config = test_config();
        let cookie = expired_session_cookie(&config);
        assert!(cookie.starts_with("vitrine.session-token=;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(!cookie.contains("Secure"));

        config.secure_cookie = true;
        let expired = expired_session_cookie(&config);
        assert!(expired.contains("Max-Age=0"));
        assert!(expired.ends_with("; Secure"));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = SessionSecret::new("super-secret".to_string()).expect("valid secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(SessionSecret::new(String::new()).is_err());
    }

    #[test]
    fn test_production_validation() {
        let config = SessionConfig::default();
        assert!(config.validate_for_production(true).is_err());
        assert!(config.validate_for_production(false).is_ok());

        let short = SessionConfig::default()
            .with_secret(SessionSecret::new("short".to_string()).expect("valid secret"));
        assert!(short.validate_for_production(true).is_err());

        assert!(test_config().validate_for_production(true).is_ok());
    }
}
