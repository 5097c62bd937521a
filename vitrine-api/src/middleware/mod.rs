//! Middleware modules for Vitrine API
//!
//! - `session`: session resolution and the identity extractors
//! - `rate_limit`: per-IP rate limiting of public write endpoints
//!
//! # Middleware Order
//!
//! ```ignore
//! Router::new()
//!     .route("/api/admin/stats", get(handler))
//!     // Resolves the identity once and stores it in request extensions
//!     .layer(middleware::from_fn_with_state(resolver, session_middleware))
//!     // Outermost
//!     .layer(middleware::from_fn(observability_middleware))
//! ```
//!
//! The introspection endpoint itself must never sit behind
//! `session_middleware`: the resolver calls it for every protected request.

pub mod rate_limit;
pub mod session;

pub use rate_limit::{rate_limit_middleware, RateLimitError, RateLimitState};
pub use session::{
    require_page_session, session_middleware, CurrentIdentity, RequireAdmin, RequireStaff,
    RequireUser, UNAUTHORIZED_PAGE,
};
