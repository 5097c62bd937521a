//! Public analytics intake.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use std::sync::Arc;
use vitrine_cache::ResponseCache;
use vitrine_core::Resource;

use crate::db::DashboardStore;
use crate::error::{ApiError, ApiResult};
use crate::routes::admin::count_key;
use crate::state::AppState;
use crate::telemetry::METRICS;
use crate::types::{AcceptedResponse, AnalyticsEventRequest};

/// POST /api/analytics
///
/// `202` on success; `400` with `{field, reason}` details when the payload
/// fails validation.
pub async fn record_event(
    State(store): State<Arc<dyn DashboardStore>>,
    State(cache): State<ResponseCache>,
    payload: Result<Json<AnalyticsEventRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    let Json(req) = payload?;

    let event = req.validate().map_err(|e| {
        tracing::debug!(field = e.field(), error = %e, "Rejected analytics event");
        ApiError::from(e)
    })?;

    store.record_event(&event).await?;
    cache.invalidate(count_key(Resource::PageViews));

    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_analytics_event(event.kind.as_str());
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            event_id: event.event_id,
        }),
    ))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/api/analytics", post(record_event))
}
