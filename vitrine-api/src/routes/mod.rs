//! Router assembly.
//!
//! | path                  | access                      |
//! |-----------------------|-----------------------------|
//! | `/`, `/unauthorized`  | public                      |
//! | `/admin`              | page guard (303 when anonymous) |
//! | `/api/auth/*`         | public, outside the session layer |
//! | `/api/admin/*`        | session layer + extractors  |
//! | `/api/analytics`      | public, rate-limited        |
//! | `/health/*`, `/metrics` | public                    |

pub mod admin;
pub mod analytics;
pub mod health;
pub mod pages;
pub mod session;

use std::time::Duration;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::{is_production_environment, ApiConfig};
use crate::error::ApiResult;
use crate::middleware::{rate_limit_middleware, session_middleware, RateLimitState};
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

// ============================================================================
// ROUTER BUILDER
// ============================================================================

/// Builds the application router with its security layers.
pub struct SecureRouterBuilder {
    state: AppState,
    api_config: ApiConfig,
    rate_limit_state: RateLimitState,
    metrics_enabled: bool,
}

impl SecureRouterBuilder {
    /// In production environments, refuses insecure CORS and session settings.
    pub fn new(state: AppState, api_config: ApiConfig) -> ApiResult<Self> {
        let production = is_production_environment();
        if production {
            api_config.validate_for_production()?;
        }
        state.session_config.validate_for_production(production)?;

        let rate_limit_state = RateLimitState::new(&api_config);
        Ok(Self {
            state,
            api_config,
            rate_limit_state,
            metrics_enabled: true,
        })
    }

    /// Serve or omit `GET /metrics`.
    pub fn with_metrics_endpoint(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Build the complete router.
    ///
    /// # Middleware Order (outer to inner)
    /// 1. CORS (outermost) - handles preflight requests
    /// 2. Observability - tracing and metrics
    /// 3. Rate limiting - `/api/analytics` only
    /// 4. Session resolution - `/api/admin/*` and guarded pages only
    pub fn build(self) -> Router {
        let resolver = self.state.resolver.clone();

        let protected = Router::new()
            .nest("/api/admin", admin::create_router())
            .merge(pages::protected_router())
            .layer(from_fn_with_state(resolver, session_middleware));

        let analytics = analytics::create_router().layer(from_fn_with_state(
            self.rate_limit_state,
            rate_limit_middleware,
        ));

        let mut router = Router::new()
            .merge(protected)
            .merge(pages::public_router())
            .nest("/api/auth", session::create_router())
            .merge(analytics)
            .nest("/health", health::create_router());
        if self.metrics_enabled {
            router = router.route("/metrics", get(metrics_handler));
        }
        let router = router.with_state(self.state);

        let cors = build_cors_layer(&self.api_config);

        router.layer(from_fn(observability_middleware)).layer(cors)
    }
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::COOKIE])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("retry-after"),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}

/// Create the complete application router.
pub fn create_router(state: AppState, api_config: &ApiConfig) -> ApiResult<Router> {
    SecureRouterBuilder::new(state, api_config.clone()).map(SecureRouterBuilder::build)
}
