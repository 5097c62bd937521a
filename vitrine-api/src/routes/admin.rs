//! Admin dashboard API.
//!
//! Reads go through the response cache; writes invalidate the keys they
//! change so the next dashboard load refetches.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::future::try_join_all;
use vitrine_cache::{CacheKey, ResponseCache};
use vitrine_core::{Brand, Resource};

use crate::config::CacheSettings;
use crate::db::DashboardStore;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{RequireAdmin, RequireStaff, RequireUser};
use crate::state::AppState;
use crate::types::{BrandListResponse, CreateBrandRequest, StatsResponse, WhoAmIResponse};

/// Cache key of a resource count: `count:<resource>`.
pub fn count_key(resource: Resource) -> CacheKey {
    CacheKey::new("count").with(resource.as_str())
}

/// Cache key of the brand listing.
pub fn brand_list_key() -> CacheKey {
    CacheKey::new("list").with("brands")
}

/// Read one resource count through the cache with the dashboard TTL.
pub async fn cached_count(
    cache: &ResponseCache,
    store: &Arc<dyn DashboardStore>,
    settings: &CacheSettings,
    resource: Resource,
) -> ApiResult<u64> {
    let store = Arc::clone(store);
    let count = cache
        .get(
            count_key(resource),
            move || async move { store.count(resource).await },
            Some(settings.dashboard_ttl),
        )
        .await?;
    Ok(count)
}

/// GET /api/admin/stats
pub async fn stats(
    _staff: RequireStaff,
    State(cache): State<ResponseCache>,
    State(store): State<Arc<dyn DashboardStore>>,
    State(settings): State<CacheSettings>,
) -> ApiResult<Json<StatsResponse>> {
    let counts = try_join_all(
        Resource::ALL
            .iter()
            .map(|resource| cached_count(&cache, &store, &settings, *resource)),
    )
    .await?;

    let mut response = StatsResponse::default();
    for (resource, count) in Resource::ALL.iter().zip(counts) {
        match resource {
            Resource::Brands => response.brands = count,
            Resource::Products => response.products = count,
            Resource::Users => response.users = count,
            Resource::PageViews => response.page_views = count,
        }
    }
    Ok(Json(response))
}

/// GET /api/admin/brands
pub async fn list_brands(
    _staff: RequireStaff,
    State(cache): State<ResponseCache>,
    State(store): State<Arc<dyn DashboardStore>>,
) -> ApiResult<Json<BrandListResponse>> {
    let brands: Vec<Brand> = cache
        .get(
            brand_list_key(),
            move || async move { store.list_brands().await },
            None,
        )
        .await?;
    let total = brands.len();
    Ok(Json(BrandListResponse { brands, total }))
}

/// POST /api/admin/brands
pub async fn create_brand(
    RequireAdmin(admin): RequireAdmin,
    State(cache): State<ResponseCache>,
    State(store): State<Arc<dyn DashboardStore>>,
    payload: Result<Json<CreateBrandRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    let name = req.validate()?;
    let brand = store
        .create_brand(&name)
        .await?
        .ok_or_else(|| ApiError::entity_already_exists("brand", vitrine_core::slugify(&name)))?;

    cache.invalidate(count_key(Resource::Brands));
    cache.invalidate(brand_list_key());

    tracing::info!(
        brand_id = %brand.brand_id,
        slug = %brand.slug,
        created_by = ?admin.user_id,
        "Brand created"
    );
    Ok((StatusCode::CREATED, Json(brand)))
}

/// GET /api/admin/me
pub async fn whoami(RequireUser(identity): RequireUser) -> ApiResult<Json<WhoAmIResponse>> {
    WhoAmIResponse::from_identity(&identity)
        .map(Json)
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))
}

/// Admin routes. Requires `session_middleware`.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/brands", get(list_brands).post(create_brand))
        .route("/me", get(whoami))
}
