//! Read-through response cache with request coalescing.
//!
//! Each key maps to a slot holding an optional stored value and an optional
//! in-flight fetch. The in-flight fetch is a [`Shared`] future: the first
//! reader creates it, later readers clone it, and whichever reader polls it
//! drives it. When the fetch completes it settles its own slot exactly once
//! (store on success, remove on failure) before any waiter sees the result.
//!
//! Every fetch gets a generation number. Settling only touches a slot whose
//! in-flight generation still matches, so a fetch that outlives an
//! `invalidate` cannot write its result back.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use vitrine_core::{CacheError, VitrineError, VitrineResult};

use super::config::CacheConfig;
use super::freshness::{CacheRead, ReadOptions, ReadSource};
use super::stats::{CacheStats, StatsRecorder};

type SharedFetch = Shared<BoxFuture<'static, VitrineResult<Value>>>;

struct StoredValue {
    value: Value,
    stored_at: Instant,
    expires_at: Instant,
}

struct InFlight {
    generation: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct Slot {
    stored: Option<StoredValue>,
    in_flight: Option<InFlight>,
}

impl Slot {
    fn in_flight_generation(&self) -> Option<u64> {
        self.in_flight.as_ref().map(|f| f.generation)
    }
}

/// What a read does once the slot lock is released.
enum Plan {
    Hit {
        value: Value,
        stored_at: Instant,
    },
    Stale {
        value: Value,
        stored_at: Instant,
        refresh: Option<SharedFetch>,
    },
    Join(SharedFetch),
    Lead(SharedFetch),
}

struct Inner {
    config: CacheConfig,
    slots: DashMap<String, Slot>,
    next_generation: AtomicU64,
    stats: StatsRecorder,
}

impl Inner {
    /// Record the outcome of fetch `generation` for `key`.
    fn settle(&self, key: &str, generation: u64, ttl: Duration, outcome: &VitrineResult<Value>) {
        match outcome {
            Ok(value) => {
                let Some(mut slot) = self.slots.get_mut(key) else {
                    tracing::debug!(key, generation, "Fetch finished after invalidation, not stored");
                    return;
                };
                if slot.in_flight_generation() != Some(generation) {
                    tracing::debug!(key, generation, "Fetch superseded, not stored");
                    return;
                }
                let now = Instant::now();
                slot.in_flight = None;
                slot.stored = Some(StoredValue {
                    value: value.clone(),
                    stored_at: now,
                    expires_at: now + ttl,
                });
            }
            Err(err) => {
                self.stats.failure();
                self.slots
                    .remove_if(key, |_, slot| slot.in_flight_generation() == Some(generation));
                tracing::warn!(key, generation, error = %err, "Cache fetch failed, nothing stored");
            }
        }
    }
}

/// Process-wide read-through cache.
///
/// Cloning is cheap and every clone shares the same entries.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<Inner>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("config", &self.inner.config)
            .field("entries", &self.inner.slots.len())
            .finish()
    }
}

impl ResponseCache {
    /// Create an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                slots: DashMap::new(),
                next_generation: AtomicU64::new(1),
                stats: StatsRecorder::default(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Get a value, running `fetch` only when no live value and no in-flight
    /// fetch exist for `key`.
    ///
    /// `ttl` overrides [`CacheConfig::default_ttl`] for a value stored by this
    /// call. Errors from `fetch` are returned unchanged to this caller and to
    /// every caller that joined the same fetch.
    pub async fn get<T, F, Fut>(
        &self,
        key: impl AsRef<str>,
        fetch: F,
        ttl: Option<Duration>,
    ) -> VitrineResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = VitrineResult<T>> + Send + 'static,
    {
        let options = ReadOptions {
            ttl,
            ..ReadOptions::default()
        };
        self.read(key, fetch, options).await.map(CacheRead::into_value)
    }

    /// Like [`get`](Self::get), with a read policy and metadata about how
    /// the value was obtained.
    pub async fn read<T, F, Fut>(
        &self,
        key: impl AsRef<str>,
        fetch: F,
        options: ReadOptions,
    ) -> VitrineResult<CacheRead<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = VitrineResult<T>> + Send + 'static,
    {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(CacheError::InvalidKey.into());
        }
        let ttl = options.ttl.unwrap_or(self.inner.config.default_ttl);
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl {
                key: key.to_string(),
            }
            .into());
        }

        match self.plan(key, ttl, options, fetch) {
            Plan::Hit { value, stored_at } => {
                self.inner.stats.hit();
                tracing::trace!(key, "Cache hit");
                Ok(CacheRead::new(decode(key, value)?, ReadSource::Hit, stored_at))
            }
            Plan::Stale {
                value,
                stored_at,
                refresh,
            } => {
                self.inner.stats.stale();
                if let Some(refresh) = refresh {
                    tracing::debug!(key, "Serving stale value, refreshing in background");
                    tokio::spawn(async move {
                        // Outcome is recorded by the fetch itself.
                        let _ = refresh.await;
                    });
                }
                Ok(CacheRead::new(decode(key, value)?, ReadSource::Stale, stored_at))
            }
            Plan::Join(fetch) => {
                self.inner.stats.coalesced();
                tracing::debug!(key, "Joining in-flight fetch");
                let value = fetch.await?;
                Ok(CacheRead::new(decode(key, value)?, ReadSource::Coalesced, Instant::now()))
            }
            Plan::Lead(fetch) => {
                self.inner.stats.miss();
                tracing::debug!(key, "Cache miss");
                let value = fetch.await?;
                Ok(CacheRead::new(decode(key, value)?, ReadSource::Miss, Instant::now()))
            }
        }
    }

    /// Decide what to do for `key` while holding its slot lock.
    ///
    /// The lock is released before anything is awaited.
    fn plan<T, F, Fut>(&self, key: &str, ttl: Duration, options: ReadOptions, fetch: F) -> Plan
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = VitrineResult<T>> + Send + 'static,
    {
        let now = Instant::now();
        let serve_stale = options.policy.is_stale_while_revalidate();
        let mut slot = self.inner.slots.entry(key.to_string()).or_default();

        if let Some(stored) = slot.stored.as_ref() {
            if stored.expires_at > now {
                return Plan::Hit {
                    value: stored.value.clone(),
                    stored_at: stored.stored_at,
                };
            }
        }

        if let Some(in_flight) = slot.in_flight.as_ref() {
            if serve_stale {
                if let Some(stored) = slot.stored.as_ref() {
                    return Plan::Stale {
                        value: stored.value.clone(),
                        stored_at: stored.stored_at,
                        refresh: None,
                    };
                }
            }
            return Plan::Join(in_flight.fetch.clone());
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let shared = self.start_fetch(key.to_string(), generation, ttl, fetch);
        slot.in_flight = Some(InFlight {
            generation,
            fetch: shared.clone(),
        });

        if serve_stale {
            if let Some(stored) = slot.stored.as_ref() {
                return Plan::Stale {
                    value: stored.value.clone(),
                    stored_at: stored.stored_at,
                    refresh: Some(shared),
                };
            }
        }
        Plan::Lead(shared)
    }

    /// Wrap `fetch` into the shared future registered for `key`.
    fn start_fetch<T, F, Fut>(
        &self,
        key: String,
        generation: u64,
        ttl: Duration,
        fetch: F,
    ) -> SharedFetch
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = VitrineResult<T>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let timeout = inner.config.fetch_timeout;

        async move {
            // A panic must still reach `settle`, or the key stays in flight.
            let guarded = AssertUnwindSafe(async move { fetch().await }).catch_unwind();
            let outcome = match tokio::time::timeout(timeout, guarded).await {
                Ok(Ok(Ok(value))) => serde_json::to_value(&value).map_err(|e| {
                    VitrineError::from(CacheError::Encode {
                        key: key.clone(),
                        reason: e.to_string(),
                    })
                }),
                Ok(Ok(Err(err))) => Err(err),
                Ok(Err(_)) => Err(VitrineError::from(CacheError::FetchPanicked {
                    key: key.clone(),
                })),
                Err(_) => Err(VitrineError::from(CacheError::FetchTimeout {
                    key: key.clone(),
                    timeout,
                })),
            };
            inner.settle(&key, generation, ttl, &outcome);
            outcome
        }
        .boxed()
        .shared()
    }

    /// Remove any value and any in-flight marker for `key`.
    pub fn invalidate(&self, key: impl AsRef<str>) {
        let key = key.as_ref();
        if self.inner.slots.remove(key).is_some() {
            self.inner.stats.invalidated(1);
            tracing::debug!(key, "Cache key invalidated");
        }
    }

    /// Remove every key starting with `prefix`. Returns how many were removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut removed = 0usize;
        self.inner.slots.retain(|key, _| {
            let keep = !key.starts_with(prefix);
            if !keep {
                removed += 1;
            }
            keep
        });
        self.inner.stats.invalidated(removed as u64);
        tracing::debug!(prefix, removed, "Cache prefix invalidated");
        removed
    }

    /// Remove every key.
    pub fn invalidate_all(&self) {
        let removed = self.inner.slots.len();
        self.inner.slots.clear();
        self.inner.stats.invalidated(removed as u64);
        tracing::info!(removed, "Cache cleared");
    }

    /// Whether `key` currently has a fetch in flight.
    pub fn is_in_flight(&self, key: impl AsRef<str>) -> bool {
        self.inner
            .slots
            .get(key.as_ref())
            .is_some_and(|slot| slot.in_flight.is_some())
    }

    /// Number of keys holding a value or an in-flight fetch.
    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot(self.inner.slots.len() as u64)
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> VitrineResult<T> {
    serde_json::from_value(value).map_err(|e| {
        CacheError::Decode {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
