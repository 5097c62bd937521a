//! Property-Based Tests for Cache Expiry
//!
//! For any key and TTL, a value read at `t0` is served from the cache at
//! `t0 + ttl - ε` and refetched at `t0 + ttl + ε`.

use std::time::Duration;

use proptest::prelude::*;
use tokio::runtime::Runtime;
use vitrine_cache::{CacheConfig, ReadOptions, ReadSource, ResponseCache};
use vitrine_test_utils::generators::{arb_cache_key, arb_ttl};
use vitrine_test_utils::FetchCounter;

const EPSILON: Duration = Duration::from_millis(1);

fn paused_runtime() -> Result<Runtime, TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_value_lives_exactly_ttl(key in arb_cache_key(), ttl in arb_ttl()) {
        let rt = paused_runtime()?;
        rt.block_on(async {
            let cache = ResponseCache::default();
            let counter = FetchCounter::new();

            let first = cache.get(&key, counter.returning(1u32), Some(ttl)).await;
            prop_assert_eq!(first, Ok(1));

            tokio::time::advance(ttl - EPSILON).await;
            let before = cache.get(&key, counter.returning(2u32), Some(ttl)).await;
            prop_assert_eq!(before, Ok(1));
            prop_assert_eq!(counter.calls(), 1);

            tokio::time::advance(EPSILON * 2).await;
            let after = cache.get(&key, counter.returning(3u32), Some(ttl)).await;
            prop_assert_eq!(after, Ok(3));
            prop_assert_eq!(counter.calls(), 2);
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_default_ttl_applies_without_override(ttl in arb_ttl()) {
        let rt = paused_runtime()?;
        rt.block_on(async {
            let cache = ResponseCache::new(CacheConfig::new().with_default_ttl(ttl));
            let counter = FetchCounter::new();

            cache
                .get("k", counter.returning(1u32), None)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            tokio::time::advance(ttl - EPSILON).await;
            let hit = cache
                .read("k", counter.returning(2u32), ReadOptions::new())
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(hit.source(), ReadSource::Hit);

            tokio::time::advance(EPSILON * 2).await;
            let miss = cache
                .read("k", counter.returning(3u32), ReadOptions::new())
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(miss.source(), ReadSource::Miss);
            prop_assert_eq!(miss.into_value(), 3);
            Ok::<(), TestCaseError>(())
        })?;
    }
}

#[tokio::test(start_paused = true)]
async fn per_call_ttl_overrides_default() {
    let cache = ResponseCache::new(CacheConfig::new().with_default_ttl(Duration::from_secs(300)));
    let counter = FetchCounter::new();

    cache
        .get("count:brands", counter.returning(1u64), Some(Duration::from_secs(30)))
        .await
        .expect("first read");
    tokio::time::advance(Duration::from_secs(31)).await;
    cache
        .get("count:brands", counter.returning(2u64), Some(Duration::from_secs(30)))
        .await
        .expect("second read");

    assert_eq!(counter.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn fetch_timeout_frees_the_key() {
    let cache = ResponseCache::new(CacheConfig::new().with_fetch_timeout(Duration::from_secs(2)));
    let counter = FetchCounter::new();

    let timed_out = cache.get("count:users", counter.hanging::<u64>(), None).await;
    assert!(timed_out.is_err());
    assert!(!cache.is_in_flight("count:users"));

    let retried = cache.get("count:users", counter.returning(9u64), None).await;
    assert_eq!(retried, Ok(9));
    assert_eq!(counter.calls(), 2);
}
