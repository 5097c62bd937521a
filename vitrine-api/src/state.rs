//! Shared application state for Axum routers.

use std::sync::Arc;

use vitrine_cache::ResponseCache;

use crate::auth::SessionConfig;
use crate::config::CacheSettings;
use crate::db::DashboardStore;
use crate::session::ResolveSession;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Dashboard data.
    pub store: Arc<dyn DashboardStore>,
    /// Process-wide response cache. Clones share entries.
    pub cache: ResponseCache,
    /// Turns request cookies into an identity.
    pub resolver: Arc<dyn ResolveSession>,
    pub session_config: Arc<SessionConfig>,
    pub cache_settings: CacheSettings,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DashboardStore>,
        cache: ResponseCache,
        resolver: Arc<dyn ResolveSession>,
        session_config: Arc<SessionConfig>,
        cache_settings: CacheSettings,
    ) -> Self {
        Self {
            store,
            cache,
            resolver,
            session_config,
            cache_settings,
            start_time: std::time::Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<dyn DashboardStore>, store);
crate::impl_from_ref!(ResponseCache, cache);
crate::impl_from_ref!(Arc<dyn ResolveSession>, resolver);
crate::impl_from_ref!(Arc<SessionConfig>, session_config);
crate::impl_from_ref!(CacheSettings, cache_settings);
crate::impl_from_ref!(std::time::Instant, start_time);
