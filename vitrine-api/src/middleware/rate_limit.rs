//! Per-client rate limiting for public write endpoints.
//!
//! Only `POST /api/analytics` is public and writes, so limits are keyed by
//! client IP alone. The client IP is the socket peer unless that peer is a
//! configured trusted proxy, in which case its forwarding headers are used.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter,
};

use crate::config::ApiConfig;

/// Idle client buckets are swept once per this many checks.
const SWEEP_EVERY: u64 = 1024;

/// State for rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    enabled: bool,
    per_minute: u32,
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
    trusted_proxies: Arc<HashSet<IpAddr>>,
    checks: Arc<AtomicU64>,
}

impl RateLimitState {
    pub fn new(config: &ApiConfig) -> Self {
        let per_minute = NonZeroU32::new(config.analytics_rate_per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.rate_limit_burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(per_minute).allow_burst(burst);
        Self {
            enabled: config.rate_limit_enabled,
            per_minute: per_minute.get(),
            limiter: Arc::new(RateLimiter::keyed(quota)),
            trusted_proxies: Arc::new(config.trusted_proxies.iter().copied().collect()),
            checks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of clients with a bucket right now.
    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }

    /// Drop buckets that have refilled completely.
    pub fn sweep(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    fn check(&self, ip: IpAddr) -> Result<(), RateLimitError> {
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep();
        }

        self.limiter.check_key(&ip).map_err(|not_until| {
            let retry_after = not_until
                .wait_time_from(DefaultClock::default().now())
                .as_secs()
                .max(1);
            tracing::debug!(%ip, retry_after, "Rate limited");
            RateLimitError { retry_after }
        })
    }
}

/// Error type for rate limit middleware.
#[derive(Debug)]
pub struct RateLimitError {
    /// Seconds until the client may retry
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let error = crate::error::ApiError::too_many_requests(Some(self.retry_after));
        let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(error)).into_response();
        response.headers_mut().insert(
            HeaderName::from_static("retry-after"),
            HeaderValue::from_str(&self.retry_after.to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("60")),
        );
        response
    }
}

/// Client IP for rate limiting.
///
/// Forwarding headers are only read when the socket peer is a trusted proxy;
/// otherwise a client could pick its own key on every request.
fn extract_client_ip(
    request: &Request,
    peer: Option<SocketAddr>,
    trusted_proxies: &HashSet<IpAddr>,
) -> IpAddr {
    let Some(peer) = peer.map(|addr| addr.ip()) else {
        return IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    };
    if !trusted_proxies.contains(&peer) {
        return peer;
    }

    // X-Forwarded-For can contain multiple IPs, take the first one
    let forwarded_for = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(',').next())
        .and_then(|ip| ip.trim().parse::<IpAddr>().ok());

    let real_ip = || {
        request
            .headers()
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
    };

    forwarded_for.or_else(real_ip).unwrap_or(peer)
}

/// Rate limiting middleware.
///
/// When limited, returns 429 Too Many Requests with a Retry-After header.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.enabled {
        return Ok(next.run(request).await);
    }

    let ip = extract_client_ip(
        &request,
        connect_info.map(|ConnectInfo(addr)| addr),
        &state.trusted_proxies,
    );
    state.check(ip)?;

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        HeaderName::from_static("x-ratelimit-limit"),
        HeaderValue::from_str(&state.per_minute.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("120")),
    );
    Ok(response)
}
