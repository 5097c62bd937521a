//! Read policies and read metadata.
//!
//! Callers pick how an expired entry is handled via [`ReadPolicy`], and
//! every [`CacheRead`] reports where its value came from.

use std::time::Duration;
use tokio::time::Instant;

/// How a read treats an expired entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Never return an expired value. An expired entry is refetched and the
    /// caller waits for the result.
    #[default]
    Fresh,

    /// Return an expired value immediately and refresh it in the background.
    ///
    /// Only one refresh runs per key; a read with no cached value at all
    /// behaves like `Fresh`.
    StaleWhileRevalidate,
}

impl ReadPolicy {
    pub fn is_stale_while_revalidate(&self) -> bool {
        matches!(self, Self::StaleWhileRevalidate)
    }
}

/// Per-read options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadOptions {
    /// Lifetime for a value stored by this read. `None` uses the cache default.
    pub ttl: Option<Duration>,
    pub policy: ReadPolicy,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_policy(mut self, policy: ReadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn stale_while_revalidate(self) -> Self {
        self.with_policy(ReadPolicy::StaleWhileRevalidate)
    }
}

/// Where the value of a read came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Served from a live entry.
    Hit,
    /// This read ran the fetch.
    Miss,
    /// Joined a fetch started by another reader.
    Coalesced,
    /// Served from an expired entry while a refresh runs.
    Stale,
}

/// Result of a cache read, carrying how and when the value was obtained.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    source: ReadSource,
    stored_at: Instant,
}

impl<T> CacheRead<T> {
    pub(crate) fn new(value: T, source: ReadSource, stored_at: Instant) -> Self {
        Self {
            value,
            source,
            stored_at,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    /// True when no fetch was awaited for this read.
    pub fn was_cache_hit(&self) -> bool {
        matches!(self.source, ReadSource::Hit | ReadSource::Stale)
    }

    pub fn was_stale(&self) -> bool {
        self.source == ReadSource::Stale
    }

    /// When the value was stored (or fetched, for a miss).
    pub fn stored_at(&self) -> Instant {
        self.stored_at
    }

    /// Time since the value was stored.
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.stored_at)
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            source: self.source,
            stored_at: self.stored_at,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_default_is_fresh() {
        assert_eq!(ReadPolicy::default(), ReadPolicy::Fresh);
        assert!(!ReadPolicy::Fresh.is_stale_while_revalidate());
        assert!(ReadPolicy::StaleWhileRevalidate.is_stale_while_revalidate());
    }

    #[test]
    fn test_read_options_builder() {
        let options = ReadOptions::new()
            .with_ttl(Duration::from_secs(30))
            .stale_while_revalidate();
        assert_eq!(options.ttl, Some(Duration::from_secs(30)));
        assert_eq!(options.policy, ReadPolicy::StaleWhileRevalidate);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_read_age() {
        let read = CacheRead::new("value", ReadSource::Hit, Instant::now());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(read.age(), Duration::from_secs(5));
        assert!(read.was_cache_hit());
    }

    #[test]
    fn test_cache_read_sources() {
        let miss = CacheRead::new(1, ReadSource::Miss, Instant::now());
        assert!(!miss.was_cache_hit());

        let stale = CacheRead::new(1, ReadSource::Stale, Instant::now());
        assert!(stale.was_cache_hit());
        assert!(stale.was_stale());
    }

    #[test]
    fn test_cache_read_map() {
        let read = CacheRead::new(42i32, ReadSource::Coalesced, Instant::now());
        let mapped = read.map(|v| v.to_string());
        assert_eq!(mapped.source(), ReadSource::Coalesced);
        assert_eq!(mapped.into_value(), "42");
    }
}
