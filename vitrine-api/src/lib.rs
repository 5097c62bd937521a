//! VITRINE API - HTTP Layer
//!
//! Axum server for the marketing site and admin dashboard:
//! - session resolution through the introspection endpoint, failing closed
//!   to an anonymous identity
//! - the admin dashboard, whose counts are read through the response cache
//! - public analytics intake

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod macros;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use auth::{
    issue_session_token, read_cookie, verify_session_token, SessionClaims, SessionClock,
    SessionConfig, SessionSecret,
};
pub use config::{is_production_environment, ApiConfig, CacheSettings};
pub use db::{DashboardStore, DbConfig, InMemoryStore, PgStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{CurrentIdentity, RequireAdmin, RequireStaff, RequireUser};
pub use routes::{create_router, SecureRouterBuilder};
pub use session::{
    AnonymousReason, ResolveSession, Resolution, SessionResolver, StaticSessionResolver,
};
pub use state::AppState;
pub use types::*;
