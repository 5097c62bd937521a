//! Vitrine Test Utilities
//!
//! Shared test infrastructure for the Vitrine workspace:
//! - Counting fetch functions for cache tests
//! - Session fixtures
//! - Proptest generators
//! - A loopback stub of the session introspection endpoint

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::Notify;

pub use vitrine_core::{
    CacheError, Resource, Role, SessionEnvelope, SessionIdentity, SessionUser, StorageError,
    VitrineError, VitrineResult,
};

// ============================================================================
// FETCH COUNTERS
// ============================================================================

/// Builds fetch functions that count how many times they were invoked.
///
/// Clones share one counter, so a counter can be handed to spawned tasks.
#[derive(Debug, Clone, Default)]
pub struct FetchCounter {
    calls: Arc<AtomicUsize>,
}

impl FetchCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fetch functions invoked so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wrap an arbitrary future as a counted fetch function.
    pub fn fetch<T, Fut>(
        &self,
        fut: Fut,
    ) -> impl FnOnce() -> BoxFuture<'static, VitrineResult<T>> + Send + 'static
    where
        T: Send + 'static,
        Fut: Future<Output = VitrineResult<T>> + Send + 'static,
    {
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            fut.boxed()
        }
    }

    /// Fetch that resolves immediately with `value`.
    pub fn returning<T>(
        &self,
        value: T,
    ) -> impl FnOnce() -> BoxFuture<'static, VitrineResult<T>> + Send + 'static
    where
        T: Send + 'static,
    {
        self.fetch(async move { Ok(value) })
    }

    /// Fetch that resolves with `value` after `delay`.
    pub fn delayed<T>(
        &self,
        value: T,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, VitrineResult<T>> + Send + 'static
    where
        T: Send + 'static,
    {
        self.fetch(async move {
            tokio::time::sleep(delay).await;
            Ok(value)
        })
    }

    /// Fetch that resolves with `value` once `gate` is notified.
    pub fn gated<T>(
        &self,
        value: T,
        gate: Arc<Notify>,
    ) -> impl FnOnce() -> BoxFuture<'static, VitrineResult<T>> + Send + 'static
    where
        T: Send + 'static,
    {
        self.fetch(async move {
            gate.notified().await;
            Ok(value)
        })
    }

    /// Fetch that fails with `error`.
    pub fn failing<T>(
        &self,
        error: VitrineError,
    ) -> impl FnOnce() -> BoxFuture<'static, VitrineResult<T>> + Send + 'static
    where
        T: Send + 'static,
    {
        self.fetch(async move { Err(error) })
    }

    /// Fetch that never resolves.
    pub fn hanging<T>(&self) -> impl FnOnce() -> BoxFuture<'static, VitrineResult<T>> + Send + 'static
    where
        T: Send + 'static,
    {
        self.fetch(futures_util::future::pending())
    }
}

/// An upstream error as a data-access layer would report it.
pub fn upstream_error(reason: &str) -> VitrineError {
    StorageError::QueryFailed {
        reason: reason.to_string(),
    }
    .into()
}

// ============================================================================
// SESSION FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;

    pub fn user(id: &str, role: Option<&str>) -> SessionUser {
        SessionUser {
            id: id.to_string(),
            name: Some(format!("User {id}")),
            email: Some(format!("{id}@vitrine.test")),
            image: None,
            role: role.map(str::to_string),
        }
    }

    pub fn admin_user() -> SessionUser {
        user("admin-1", Some("ADMIN"))
    }

    pub fn staff_user() -> SessionUser {
        user("staff-1", Some("STAFF"))
    }

    /// Authenticated user without a role.
    pub fn plain_user() -> SessionUser {
        user("user-1", None)
    }

    pub fn admin_identity() -> SessionIdentity {
        SessionIdentity::from_user(admin_user())
    }

    pub fn staff_identity() -> SessionIdentity {
        SessionIdentity::from_user(staff_user())
    }

    pub fn plain_identity() -> SessionIdentity {
        SessionIdentity::from_user(plain_user())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// Non-empty cache keys in the `<namespace>:<name>` shape.
    pub fn arb_cache_key() -> impl Strategy<Value = String> {
        ("[a-z]{1,8}", "[a-z_]{1,12}").prop_map(|(ns, name)| format!("{ns}:{name}"))
    }

    /// Positive TTLs between one second and one hour.
    pub fn arb_ttl() -> impl Strategy<Value = Duration> {
        (1u64..=3600).prop_map(Duration::from_secs)
    }

    pub fn arb_resource() -> impl Strategy<Value = Resource> {
        prop_oneof![
            Just(Resource::Brands),
            Just(Resource::Products),
            Just(Resource::Users),
            Just(Resource::PageViews),
        ]
    }

    /// Role strings as an upstream auth provider might send them,
    /// including unknown values and case variants.
    pub fn arb_role_string() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some("ADMIN".to_string())),
            Just(Some("admin".to_string())),
            Just(Some("STAFF".to_string())),
            Just(Some("Staff".to_string())),
            "[A-Z]{3,10}".prop_map(Some),
        ]
    }

    pub fn arb_session_user() -> impl Strategy<Value = SessionUser> {
        (
            "[a-z0-9-]{1,24}",
            proptest::option::of("[A-Za-z ]{1,20}"),
            proptest::option::of("[a-z]{1,10}@[a-z]{1,10}\\.test"),
            arb_role_string(),
        )
            .prop_map(|(id, name, email, role)| SessionUser {
                id,
                name,
                email,
                image: None,
                role,
            })
    }
}

// ============================================================================
// STUB INTROSPECTION ENDPOINT
// ============================================================================

/// What the stub introspection endpoint answers.
#[derive(Debug, Clone)]
pub enum IntrospectionBehavior {
    /// `200` with the envelope as JSON.
    Envelope(SessionEnvelope),
    /// The given status with an empty body.
    Status(u16),
    /// `200` with a raw body, sent as `application/json`.
    Body(String),
    /// Never answer.
    Hang,
}

struct StubState {
    behavior: IntrospectionBehavior,
    cookies: Mutex<Vec<Option<String>>>,
}

/// Loopback HTTP server standing in for the session introspection endpoint.
///
/// The server stops when the stub is dropped.
pub struct StubIntrospection {
    url: String,
    state: Arc<StubState>,
    handle: tokio::task::JoinHandle<()>,
}

impl StubIntrospection {
    pub const PATH: &'static str = "/api/auth/session";

    pub async fn start(behavior: IntrospectionBehavior) -> std::io::Result<Self> {
        use axum::routing::get;

        let state = Arc::new(StubState {
            behavior,
            cookies: Mutex::new(Vec::new()),
        });
        let app = axum::Router::new()
            .route(Self::PATH, get(stub_handler))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            url: format!("http://{addr}{}", Self::PATH),
            state,
            handle,
        })
    }

    /// Full URL of the introspection path.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Cookie headers received so far, in order. `None` means the request
    /// carried no cookie header.
    pub fn received_cookies(&self) -> Vec<Option<String>> {
        self.state
            .cookies
            .lock()
            .map(|cookies| cookies.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.received_cookies().len()
    }
}

impl Drop for StubIntrospection {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn stub_handler(
    axum::extract::State(state): axum::extract::State<Arc<StubState>>,
    headers: axum::http::HeaderMap,
) -> axum::response::Response {
    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;

    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Ok(mut cookies) = state.cookies.lock() {
        cookies.push(cookie);
    }

    match &state.behavior {
        IntrospectionBehavior::Envelope(envelope) => axum::Json(envelope.clone()).into_response(),
        IntrospectionBehavior::Status(code) => StatusCode::from_u16(*code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        IntrospectionBehavior::Body(body) => (
            [(header::CONTENT_TYPE, "application/json")],
            body.clone(),
        )
            .into_response(),
        IntrospectionBehavior::Hang => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_counter_counts_invocations() {
        let counter = FetchCounter::new();
        let fetch = counter.returning(5u32);
        assert_eq!(counter.calls(), 0);
        assert_eq!(fetch().await, Ok(5));
        assert_eq!(counter.calls(), 1);
    }

    #[test]
    fn test_fixture_roles() {
        assert_eq!(fixtures::admin_identity().role, Some(Role::Admin));
        assert_eq!(fixtures::staff_identity().role, Some(Role::Staff));
        assert!(fixtures::plain_identity().is_authenticated());
        assert_eq!(fixtures::plain_identity().role, None);
    }
}
