//! VITRINE API Server Entry Point
//!
//! Bootstraps configuration, selects the dashboard store, and starts the
//! Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use vitrine_api::telemetry::{init_tracing, TelemetryConfig};
use vitrine_api::{
    ApiConfig, ApiError, ApiResult, AppState, CacheSettings, DashboardStore, DbConfig,
    InMemoryStore, PgStore, SecureRouterBuilder, SessionConfig, SessionResolver,
};
use vitrine_cache::ResponseCache;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let api_config = ApiConfig::from_env();
    let session_config = Arc::new(SessionConfig::from_env(api_config.port));
    let cache_settings = CacheSettings::from_env();

    let store: Arc<dyn DashboardStore> = match DbConfig::from_env() {
        Some(db_config) => {
            tracing::info!(host = %db_config.host, db = %db_config.dbname, "Using PostgreSQL store");
            Arc::new(PgStore::from_config(&db_config)?)
        }
        None => {
            tracing::warn!("VITRINE_DB_HOST not set; using in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };

    let cache = ResponseCache::new(cache_settings.cache_config());
    let resolver = Arc::new(SessionResolver::new(Arc::clone(&session_config))?);

    let state = AppState::new(store, cache, resolver, session_config, cache_settings);
    let app = SecureRouterBuilder::new(state, api_config.clone())?
        .with_metrics_endpoint(telemetry_config.metrics_enabled)
        .build();

    let addr = api_config.bind_addr()?;
    tracing::info!(
        %addr,
        service = %telemetry_config.service_name,
        version = %telemetry_config.service_version,
        "Starting Vitrine API server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
