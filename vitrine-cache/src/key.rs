//! Structured cache keys.
//!
//! Keys are `:`-joined segments, e.g. `count:brands` or
//! `list:brands:page:2`. Segment text is escaped so that two different
//! segment lists can never produce the same key, which keeps prefix
//! invalidation (`count:`) exact.

use std::fmt;

const SEPARATOR: char = ':';

/// A cache key built from a namespace and parameter segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    encoded: String,
}

impl CacheKey {
    /// Start a key in the given namespace.
    pub fn new(namespace: impl fmt::Display) -> Self {
        let mut encoded = String::new();
        push_escaped(&mut encoded, &namespace.to_string());
        Self { encoded }
    }

    /// Append a parameter segment.
    pub fn with(mut self, segment: impl fmt::Display) -> Self {
        self.encoded.push(SEPARATOR);
        push_escaped(&mut self.encoded, &segment.to_string());
        self
    }

    /// Prefix matching every key that starts with this key's segments.
    pub fn prefix(&self) -> String {
        format!("{}{}", self.encoded, SEPARATOR)
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn into_string(self) -> String {
        self.encoded
    }
}

fn push_escaped(out: &mut String, segment: &str) {
    for ch in segment.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.encoded
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.encoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_simple_key() {
        let key = CacheKey::new("count").with("brands");
        assert_eq!(key.as_str(), "count:brands");
        assert_eq!(key.to_string(), "count:brands");
    }

    #[test]
    fn test_numeric_segments() {
        let key = CacheKey::new("list").with("brands").with("page").with(2);
        assert_eq!(key.as_str(), "list:brands:page:2");
    }

    #[test]
    fn test_separator_is_escaped() {
        let key = CacheKey::new("search").with("a:b");
        assert_eq!(key.as_str(), "search:a%3Ab");
        assert_ne!(key, CacheKey::new("search").with("a").with("b"));
    }

    #[test]
    fn test_prefix() {
        let key = CacheKey::new("count");
        assert_eq!(key.prefix(), "count:");
        assert!(CacheKey::new("count")
            .with("brands")
            .as_str()
            .starts_with(&key.prefix()));
    }

    proptest! {
        #[test]
        fn prop_distinct_segments_give_distinct_keys(
            a in proptest::collection::vec(".{0,8}", 1..4),
            b in proptest::collection::vec(".{0,8}", 1..4),
        ) {
            let build = |segments: &[String]| {
                let mut key = CacheKey::new(&segments[0]);
                for segment in &segments[1..] {
                    key = key.with(segment);
                }
                key
            };
            prop_assert_eq!(a == b, build(&a) == build(&b));
        }
    }
}
