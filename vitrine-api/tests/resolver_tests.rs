//! SessionResolver against a loopback introspection endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue};
use vitrine_api::{AnonymousReason, ResolveSession, Resolution, SessionConfig, SessionResolver};
use vitrine_test_utils::{
    fixtures, IntrospectionBehavior, Role, SessionEnvelope, StubIntrospection,
};

const COOKIE: &str = "vitrine.session-token=abc123";

async fn stub(behavior: IntrospectionBehavior) -> Result<StubIntrospection, String> {
    StubIntrospection::start(behavior)
        .await
        .map_err(|e| format!("stub failed to start: {e}"))
}

fn resolver_for(stub: &StubIntrospection, timeout: Duration) -> Result<SessionResolver, String> {
    let config = SessionConfig {
        introspection_timeout: timeout,
        ..SessionConfig::default().with_introspection_url(stub.url())
    };
    SessionResolver::new(Arc::new(config)).map_err(|e| e.message)
}

fn resolver(stub: &StubIntrospection) -> Result<SessionResolver, String> {
    resolver_for(stub, Duration::from_secs(5))
}

#[tokio::test]
async fn test_missing_cookie_is_anonymous_without_round_trip() -> Result<(), String> {
    let stub = stub(IntrospectionBehavior::Envelope(SessionEnvelope::for_user(
        fixtures::admin_user(),
    )))
    .await?;
    let resolver = resolver(&stub)?;

    let identity = resolver.resolve_cookie(None).await;
    assert!(identity.is_anonymous());

    let identity = resolver.resolve(&HeaderMap::new()).await;
    assert!(identity.is_anonymous());

    assert_eq!(stub.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_success_maps_user_and_forwards_cookie() -> Result<(), String> {
    let stub = stub(IntrospectionBehavior::Envelope(SessionEnvelope::for_user(
        fixtures::admin_user(),
    )))
    .await?;
    let resolver = resolver(&stub)?;

    let cookie = format!("theme=dark; {COOKIE}");
    let identity = resolver.resolve_cookie(Some(&cookie)).await;

    assert_eq!(identity.user_id.as_deref(), Some("admin-1"));
    assert_eq!(identity.role, Some(Role::Admin));
    assert_eq!(identity.email(), Some("admin-1@vitrine.test"));
    assert_eq!(stub.received_cookies(), vec![Some(cookie)]);
    Ok(())
}

#[tokio::test]
async fn test_server_error_is_anonymous() -> Result<(), String> {
    let stub = stub(IntrospectionBehavior::Status(500)).await?;
    let resolver = resolver(&stub)?;

    assert_eq!(
        resolver.resolve_detailed(Some(COOKIE)).await,
        Resolution::Anonymous(AnonymousReason::Status(500))
    );
    assert!(resolver.resolve_cookie(Some(COOKIE)).await.is_anonymous());
    Ok(())
}

#[tokio::test]
async fn test_malformed_json_is_anonymous() -> Result<(), String> {
    let stub = stub(IntrospectionBehavior::Body("{\"user\": ".to_string())).await?;
    let resolver = resolver(&stub)?;

    let resolution = resolver.resolve_detailed(Some(COOKIE)).await;
    assert!(
        matches!(resolution, Resolution::Anonymous(AnonymousReason::Malformed(_))),
        "got {resolution:?}"
    );
    Ok(())
}

#[tokio::test]
async fn test_null_user_is_anonymous() -> Result<(), String> {
    let stub = stub(IntrospectionBehavior::Envelope(SessionEnvelope::anonymous())).await?;
    let resolver = resolver(&stub)?;

    assert_eq!(
        resolver.resolve_detailed(Some(COOKIE)).await,
        Resolution::Anonymous(AnonymousReason::NoUser)
    );
    assert_eq!(stub.request_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_user_without_id_is_anonymous() -> Result<(), String> {
    let stub = stub(IntrospectionBehavior::Body(
        r#"{"user": {"id": "  ", "role": "ADMIN"}}"#.to_string(),
    ))
    .await?;
    let resolver = resolver(&stub)?;

    let identity = resolver.resolve_cookie(Some(COOKIE)).await;
    assert!(identity.is_anonymous());
    assert!(!identity.has_role(Role::Admin));
    Ok(())
}

#[tokio::test]
async fn test_unknown_role_is_authenticated_without_role() -> Result<(), String> {
    let stub = stub(IntrospectionBehavior::Envelope(SessionEnvelope::for_user(
        fixtures::user("u-7", Some("OWNER")),
    )))
    .await?;
    let resolver = resolver(&stub)?;

    let identity = resolver.resolve_cookie(Some(COOKIE)).await;
    assert!(identity.is_authenticated());
    assert_eq!(identity.role, None);
    assert!(!identity.is_staff_or_admin());
    Ok(())
}

#[tokio::test]
async fn test_hanging_endpoint_times_out_to_anonymous() -> Result<(), String> {
    let stub = stub(IntrospectionBehavior::Hang).await?;
    let resolver = resolver_for(&stub, Duration::from_millis(200))?;

    let resolution = resolver.resolve_detailed(Some(COOKIE)).await;
    assert_eq!(resolution, Resolution::Anonymous(AnonymousReason::Timeout));
    Ok(())
}

#[tokio::test]
async fn test_resolve_from_request_headers() -> Result<(), String> {
    let stub = stub(IntrospectionBehavior::Envelope(SessionEnvelope::for_user(
        fixtures::staff_user(),
    )))
    .await?;
    let resolver = resolver(&stub)?;

    let mut headers = HeaderMap::new();
    headers.insert(header::COOKIE, HeaderValue::from_static(COOKIE));
    let identity = resolver.resolve(&headers).await;
    assert_eq!(identity.role, Some(Role::Staff));
    Ok(())
}
