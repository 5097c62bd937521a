//! Dashboard Store
//!
//! The relational data behind the admin dashboard, reached through the
//! [`DashboardStore`] trait. Two implementations:
//!
//! - [`PgStore`]: PostgreSQL through a deadpool-postgres connection pool
//! - [`InMemoryStore`]: process-local tables for development and tests
//!
//! Route handlers never call the store for counts directly; they go through
//! the response cache with a `count:<resource>` key.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use vitrine_core::{
    new_entity_id, slugify, AnalyticsEvent, Brand, Resource, StorageError, VitrineResult,
};

use crate::error::{ApiError, ApiResult};
use crate::telemetry::METRICS;

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Data access used by the dashboard and analytics routes.
#[async_trait]
pub trait DashboardStore: Send + Sync {
    /// Number of records of a resource kind.
    async fn count(&self, resource: Resource) -> VitrineResult<u64>;

    /// Create a brand. Returns `None` when a brand with the same slug exists.
    async fn create_brand(&self, name: &str) -> VitrineResult<Option<Brand>>;

    /// All brands, newest first.
    async fn list_brands(&self) -> VitrineResult<Vec<Brand>>;

    /// Persist one analytics event.
    async fn record_event(&self, event: &AnalyticsEvent) -> VitrineResult<()>;

    /// Verify the store is reachable.
    async fn health_check(&self) -> VitrineResult<()>;

    /// Short name for logs and health output.
    fn backend(&self) -> &'static str;
}

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "vitrine".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Read the configuration from `VITRINE_DB_*` variables.
    ///
    /// Returns `None` when `VITRINE_DB_HOST` is unset, meaning no database
    /// is configured and the in-memory store should be used.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("VITRINE_DB_HOST").ok()?;
        let defaults = Self::default();
        Some(Self {
            host,
            port: std::env::var("VITRINE_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("VITRINE_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("VITRINE_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("VITRINE_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("VITRINE_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: Duration::from_secs(
                std::env::var("VITRINE_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(self.max_size));

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// POSTGRES STORE
// ============================================================================

/// Store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    async fn get_conn(&self) -> VitrineResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            StorageError::Unavailable {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

fn query_failed(err: tokio_postgres::Error) -> StorageError {
    StorageError::QueryFailed {
        reason: err.to_string(),
    }
}

/// Run a store operation and record its latency and outcome.
async fn timed<T, Fut>(operation: &'static str, fut: Fut) -> VitrineResult<T>
where
    Fut: Future<Output = VitrineResult<T>>,
{
    let start = Instant::now();
    let result = fut.await;
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_store_operation(operation, result.is_ok(), start.elapsed().as_secs_f64());
    }
    if let Err(e) = &result {
        tracing::warn!(operation, error = %e, "Store operation failed");
    }
    result
}

/// `SELECT COUNT(*)` for a resource. Page views are the `page_view` rows of
/// `analytics_events`, matching [`InMemoryStore`].
fn count_query(resource: Resource) -> &'static str {
    match resource {
        Resource::Brands => "SELECT COUNT(*) FROM brands",
        Resource::Products => "SELECT COUNT(*) FROM products",
        Resource::Users => "SELECT COUNT(*) FROM users",
        Resource::PageViews => "SELECT COUNT(*) FROM analytics_events WHERE kind = 'page_view'",
    }
}

fn brand_from_row(row: &tokio_postgres::Row) -> Brand {
    Brand {
        brand_id: row.get("brand_id"),
        name: row.get("name"),
        slug: row.get("slug"),
        created_at: row.get("created_at"),
    }
}

impl PgStore {
    async fn query_count(&self, resource: Resource) -> VitrineResult<u64> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(count_query(resource), &[])
            .await
            .map_err(|e| StorageError::CountFailed {
                resource,
                reason: e.to_string(),
            })?;
        let count: i64 = row.get(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn insert_brand(&self, name: &str) -> VitrineResult<Option<Brand>> {
        let conn = self.get_conn().await?;
        let brand = Brand {
            brand_id: new_entity_id(),
            name: name.to_string(),
            slug: slugify(name),
            created_at: chrono::Utc::now(),
        };
        let inserted = conn
            .execute(
                "INSERT INTO brands (brand_id, name, slug, created_at) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT (slug) DO NOTHING",
                &[&brand.brand_id, &brand.name, &brand.slug, &brand.created_at],
            )
            .await
            .map_err(|e| StorageError::InsertFailed {
                entity: "brand".to_string(),
                reason: e.to_string(),
            })?;
        Ok((inserted == 1).then_some(brand))
    }

    async fn select_brands(&self) -> VitrineResult<Vec<Brand>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT brand_id, name, slug, created_at FROM brands ORDER BY created_at DESC",
                &[],
            )
            .await
            .map_err(query_failed)?;
        Ok(rows.iter().map(brand_from_row).collect())
    }

    async fn insert_event(&self, event: &AnalyticsEvent) -> VitrineResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO analytics_events \
             (event_id, kind, path, referrer, metadata, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &event.event_id,
                &event.kind.as_str(),
                &event.path,
                &event.referrer,
                &event.metadata,
                &event.recorded_at,
            ],
        )
        .await
        .map_err(|e| StorageError::InsertFailed {
            entity: "analytics_event".to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

#[async_trait]
impl DashboardStore for PgStore {
    async fn count(&self, resource: Resource) -> VitrineResult<u64> {
        timed("count", self.query_count(resource)).await
    }

    async fn create_brand(&self, name: &str) -> VitrineResult<Option<Brand>> {
        timed("create_brand", self.insert_brand(name)).await
    }

    async fn list_brands(&self) -> VitrineResult<Vec<Brand>> {
        timed("list_brands", self.select_brands()).await
    }

    async fn record_event(&self, event: &AnalyticsEvent) -> VitrineResult<()> {
        timed("record_event", self.insert_event(event)).await
    }

    async fn health_check(&self) -> VitrineResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(query_failed)?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Process-local store.
///
/// Products and users are plain counters since nothing in this service
/// creates them; seed them with [`InMemoryStore::with_counts`].
#[derive(Debug)]
pub struct InMemoryStore {
    brands: RwLock<Vec<Brand>>,
    events: RwLock<Vec<AnalyticsEvent>>,
    products: AtomicU64,
    users: AtomicU64,
    count_calls: AtomicUsize,
    available: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            brands: RwLock::new(Vec::new()),
            events: RwLock::new(Vec::new()),
            products: AtomicU64::new(0),
            users: AtomicU64::new(0),
            count_calls: AtomicUsize::new(0),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counts(self, products: u64, users: u64) -> Self {
        self.products.store(products, Ordering::SeqCst);
        self.users.store(users, Ordering::SeqCst);
        self
    }

    /// Number of `count` calls served so far.
    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    /// Simulate an outage: every operation fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> VitrineResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable {
                reason: "in-memory store marked unavailable".to_string(),
            }
            .into())
        }
    }
}

#[async_trait]
impl DashboardStore for InMemoryStore {
    async fn count(&self, resource: Resource) -> VitrineResult<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        let count = match resource {
            Resource::Brands => self
                .brands
                .read()
                .map_err(|_| StorageError::LockPoisoned)?
                .len() as u64,
            Resource::PageViews => self
                .events
                .read()
                .map_err(|_| StorageError::LockPoisoned)?
                .iter()
                .filter(|e| e.kind == vitrine_core::EventKind::PageView)
                .count() as u64,
            Resource::Products => self.products.load(Ordering::SeqCst),
            Resource::Users => self.users.load(Ordering::SeqCst),
        };
        Ok(count)
    }

    async fn create_brand(&self, name: &str) -> VitrineResult<Option<Brand>> {
        self.ensure_available()?;
        let slug = slugify(name);
        let mut brands = self.brands.write().map_err(|_| StorageError::LockPoisoned)?;
        if brands.iter().any(|b| b.slug == slug) {
            return Ok(None);
        }
        let brand = Brand {
            brand_id: new_entity_id(),
            name: name.to_string(),
            slug,
            created_at: chrono::Utc::now(),
        };
        brands.push(brand.clone());
        Ok(Some(brand))
    }

    async fn list_brands(&self) -> VitrineResult<Vec<Brand>> {
        self.ensure_available()?;
        let brands = self.brands.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(brands.iter().rev().cloned().collect())
    }

    async fn record_event(&self, event: &AnalyticsEvent) -> VitrineResult<()> {
        self.ensure_available()?;
        self.events
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .push(event.clone());
        Ok(())
    }

    async fn health_check(&self) -> VitrineResult<()> {
        self.ensure_available()
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_core::{EventKind, VitrineError};

    fn page_view(path: &str) -> AnalyticsEvent {
        AnalyticsEvent {
            event_id: new_entity_id(),
            kind: EventKind::PageView,
            path: path.to_string(),
            referrer: None,
            metadata: None,
            recorded_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_count_queries() {
        assert_eq!(count_query(Resource::Brands), "SELECT COUNT(*) FROM brands");
        assert_eq!(count_query(Resource::Products), "SELECT COUNT(*) FROM products");
        assert_eq!(count_query(Resource::Users), "SELECT COUNT(*) FROM users");

        let page_views = count_query(Resource::PageViews);
        assert!(page_views.starts_with("SELECT COUNT(*) FROM analytics_events"));
        assert!(page_views.ends_with(&format!("WHERE kind = '{}'", EventKind::PageView.as_str())));
        for kind in [EventKind::Click, EventKind::Signup] {
            assert!(!page_views.contains(kind.as_str()));
        }
    }

    #[tokio::test]
    async fn test_create_brand_rejects_duplicate_slug() -> VitrineResult<()> {
        let store = InMemoryStore::new();
        assert!(store.create_brand("Acme Outdoor").await?.is_some());
        assert!(store.create_brand("acme  outdoor").await?.is_none());
        assert_eq!(store.count(Resource::Brands).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_brands_newest_first() -> VitrineResult<()> {
        let store = InMemoryStore::new();
        store.create_brand("First").await?;
        store.create_brand("Second").await?;
        let names: Vec<String> = store.list_brands().await?.into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["Second", "First"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_page_view_count_ignores_other_events() -> VitrineResult<()> {
        let store = InMemoryStore::new();
        store.record_event(&page_view("/")).await?;
        let mut click = page_view("/pricing");
        click.kind = EventKind::Click;
        store.record_event(&click).await?;
        let mut signup = page_view("/join");
        signup.kind = EventKind::Signup;
        store.record_event(&signup).await?;
        assert_eq!(store.count(Resource::PageViews).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_seeded_counts_and_call_counter() -> VitrineResult<()> {
        let store = InMemoryStore::new().with_counts(12, 3);
        assert_eq!(store.count(Resource::Products).await?, 12);
        assert_eq!(store.count(Resource::Users).await?, 3);
        assert_eq!(store.count_calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = InMemoryStore::new();
        store.set_available(false);
        assert!(matches!(
            store.health_check().await,
            Err(VitrineError::Storage(StorageError::Unavailable { .. }))
        ));
        assert!(store.count(Resource::Brands).await.is_err());
    }

    #[test]
    fn test_db_config_requires_host() {
        // VITRINE_DB_HOST is not set in the test environment.
        if std::env::var("VITRINE_DB_HOST").is_err() {
            assert!(DbConfig::from_env().is_none());
        }
    }
}
