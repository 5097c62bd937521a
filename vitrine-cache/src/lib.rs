//! Response cache with request coalescing.
//!
//! This crate provides the process-wide cache that sits between the API
//! handlers and their upstream data sources (database counts, listings).
//!
//! # Contract
//!
//! - A live (unexpired) entry is returned without calling the fetch function.
//! - While a fetch for a key is in flight, every other reader of that key
//!   waits on the same fetch instead of starting its own.
//! - A failed fetch is handed to every waiter and leaves nothing cached.
//! - `invalidate` drops both the entry and any in-flight marker.
//!
//! The cache is an ordinary value: construct one at startup, share it
//! through application state, and build isolated instances in tests.
//!
//! # Example
//!
//! ```ignore
//! let cache = ResponseCache::new(CacheConfig::default());
//!
//! let brands: u64 = cache
//!     .get("count:brands", move || async move { store.count(Resource::Brands).await },
//!          Some(Duration::from_secs(30)))
//!     .await?;
//!
//! // After a write, force the next read to refetch
//! cache.invalidate("count:brands");
//! ```

pub mod config;
pub mod freshness;
pub mod key;
pub mod response_cache;
pub mod stats;

pub use config::CacheConfig;
pub use freshness::{CacheRead, ReadOptions, ReadPolicy, ReadSource};
pub use key::CacheKey;
pub use response_cache::ResponseCache;
pub use stats::CacheStats;
