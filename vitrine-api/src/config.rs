//! API Configuration Module
//!
//! CORS, rate limiting, bind address and cache lifetimes. Configuration is
//! loaded from environment variables with sensible defaults for development.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use vitrine_cache::CacheConfig;

use crate::error::{ApiError, ApiResult};

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Check if running in a production environment (`VITRINE_ENVIRONMENT`).
pub fn is_production_environment() -> bool {
    std::env::var("VITRINE_ENVIRONMENT")
        .map(|e| matches!(e.to_lowercase().as_str(), "production" | "prod"))
        .unwrap_or(false)
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for CORS, rate limiting, and the listener.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Interface to bind.
    pub bind_host: String,

    /// Port to bind.
    pub port: u16,

    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Rate Limiting Configuration
    // ========================================================================
    /// Whether rate limiting of the public analytics endpoint is enabled.
    pub rate_limit_enabled: bool,

    /// Analytics events accepted per client IP per minute.
    pub analytics_rate_per_minute: u32,

    /// Burst capacity above the per-minute rate.
    pub rate_limit_burst: u32,

    /// Peers whose `X-Forwarded-For` / `X-Real-IP` headers are believed.
    /// Requests from any other peer are keyed by their socket address.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: 86400,
            rate_limit_enabled: true,
            analytics_rate_per_minute: 120,
            rate_limit_burst: 20,
            trusted_proxies: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `VITRINE_API_BIND`: Interface to bind (default: 0.0.0.0)
    /// - `PORT` / `VITRINE_API_PORT`: Port (default: 3000)
    /// - `VITRINE_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `VITRINE_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `VITRINE_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `VITRINE_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `VITRINE_ANALYTICS_RATE_PER_MINUTE`: Events per minute per IP (default: 120)
    /// - `VITRINE_RATE_LIMIT_BURST`: Burst capacity (default: 20)
    /// - `VITRINE_TRUSTED_PROXIES`: Comma-separated proxy IPs (default: none)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_origins = std::env::var("VITRINE_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let trusted_proxies = std::env::var("VITRINE_TRUSTED_PROXIES")
            .ok()
            .map(|s| parse_ip_list(&s))
            .unwrap_or_default();

        let port = std::env::var("PORT")
            .ok()
            .or_else(|| std::env::var("VITRINE_API_PORT").ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        Self {
            bind_host: std::env::var("VITRINE_API_BIND").unwrap_or(defaults.bind_host),
            port,
            cors_origins,
            cors_allow_credentials: std::env::var("VITRINE_CORS_ALLOW_CREDENTIALS")
                .ok()
                .map(|s| s.to_lowercase() == "true")
                .unwrap_or(false),
            cors_max_age_secs: std::env::var("VITRINE_CORS_MAX_AGE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cors_max_age_secs),
            rate_limit_enabled: std::env::var("VITRINE_RATE_LIMIT_ENABLED")
                .ok()
                .map(|s| s.to_lowercase() != "false")
                .unwrap_or(true),
            analytics_rate_per_minute: std::env::var("VITRINE_ANALYTICS_RATE_PER_MINUTE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.analytics_rate_per_minute),
            rate_limit_burst: std::env::var("VITRINE_RATE_LIMIT_BURST")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_burst),
            trusted_proxies,
        }
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
    }

    /// Refuse settings that are only acceptable in development.
    pub fn validate_for_production(&self) -> ApiResult<()> {
        if self.cors_origins.is_empty() {
            return Err(ApiError::invalid_input(
                "CORS origins not configured for production. Set VITRINE_CORS_ORIGINS.",
            ));
        }
        if self.cors_origins.iter().any(|o| o == "*") {
            return Err(ApiError::invalid_input(
                "Wildcard CORS origin is not allowed in production.",
            ));
        }
        if !self.rate_limit_enabled {
            tracing::warn!(
                "Rate limiting is disabled in production. \
                 Set VITRINE_RATE_LIMIT_ENABLED=true to protect /api/analytics."
            );
        }
        Ok(())
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // Wildcard subdomains: *.vitrine.run
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain
                        .strip_suffix(pattern)
                        .is_some_and(|sub| sub.ends_with('.'));
                }
            }
            false
        })
    }
}

/// Parse a comma-separated IP list, skipping entries that are not addresses.
fn parse_ip_list(raw: &str) -> Vec<IpAddr> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse() {
            Ok(ip) => Some(ip),
            Err(_) => {
                tracing::warn!(entry = s, "Ignoring invalid trusted proxy address");
                None
            }
        })
        .collect()
}

// ============================================================================
// CACHE SETTINGS
// ============================================================================

/// Lifetimes for cached dashboard data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// TTL for entries that do not name their own.
    pub default_ttl: Duration,
    /// TTL for `count:<resource>` entries on the admin dashboard.
    pub dashboard_ttl: Duration,
    /// Upper bound on any single cached fetch.
    pub fetch_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(60),
            dashboard_ttl: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl CacheSettings {
    /// Environment variables (all in seconds):
    /// - `VITRINE_CACHE_DEFAULT_TTL_SECS` (default: 60)
    /// - `VITRINE_CACHE_DASHBOARD_TTL_SECS` (default: 30)
    /// - `VITRINE_CACHE_FETCH_TIMEOUT_SECS` (default: 10)
    ///
    /// Zero values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |key: &str, fallback: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Self {
            default_ttl: secs("VITRINE_CACHE_DEFAULT_TTL_SECS", defaults.default_ttl),
            dashboard_ttl: secs("VITRINE_CACHE_DASHBOARD_TTL_SECS", defaults.dashboard_ttl),
            fetch_timeout: secs("VITRINE_CACHE_FETCH_TIMEOUT_SECS", defaults.fetch_timeout),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_default_ttl(self.default_ttl)
            .with_fetch_timeout(self.fetch_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert!(!config.cors_allow_credentials);
        assert_eq!(config.cors_max_age_secs, 86400);
        assert!(config.rate_limit_enabled);
        assert_eq!(config.analytics_rate_per_minute, 120);
        assert_eq!(config.rate_limit_burst, 20);
    }

    #[test]
    fn test_bind_addr() -> ApiResult<()> {
        let config = ApiConfig {
            bind_host: "127.0.0.1".to_string(),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(config.bind_addr()?.to_string(), "127.0.0.1:8080");

        let bad = ApiConfig {
            bind_host: "not a host".to_string(),
            ..Default::default()
        };
        assert!(bad.bind_addr().is_err());
        Ok(())
    }

    #[test]
    fn test_production_requires_explicit_origins() {
        let mut config = ApiConfig::default();
        assert!(config.validate_for_production().is_err());

        config.cors_origins = vec!["*".to_string()];
        assert!(config.validate_for_production().is_err());

        config.cors_origins = vec!["https://vitrine.run".to_string()];
        assert!(config.validate_for_production().is_ok());
    }

    #[test]
    fn test_origin_allowed() {
        let mut config = ApiConfig::default();
        assert!(config.is_origin_allowed("http://localhost:3000"));

        config.cors_origins = vec![
            "https://vitrine.run".to_string(),
            "*.vitrine.run".to_string(),
        ];
        assert!(config.is_origin_allowed("https://vitrine.run"));
        assert!(config.is_origin_allowed("https://admin.vitrine.run"));
        assert!(!config.is_origin_allowed("https://notvitrine.run"));
        assert!(!config.is_origin_allowed("https://evil.com"));
    }

    #[test]
    fn test_parse_trusted_proxies() {
        let proxies = parse_ip_list(" 10.0.0.1, not-an-ip,,::1 ");
        assert_eq!(
            proxies,
            vec![
                IpAddr::from([10, 0, 0, 1]),
                "::1".parse::<IpAddr>().expect("valid v6 literal"),
            ]
        );
        assert!(ApiConfig::default().trusted_proxies.is_empty());
    }

    #[test]
    fn test_cache_settings_defaults() {
        let settings = CacheSettings::default();
        assert_eq!(settings.dashboard_ttl, Duration::from_secs(30));

        let cache = settings.cache_config();
        assert_eq!(cache.default_ttl, Duration::from_secs(60));
        assert_eq!(cache.fetch_timeout, Duration::from_secs(10));
    }
}
