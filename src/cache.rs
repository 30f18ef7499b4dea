//! Bounded TTL cache keyed by request fingerprints.
//!
//! Each surface owns one `TtlCache`, constructed at startup and handed to its
//! coordinator. Expiry is lazy: an entry is only checked (and dropped) when it
//! is read. Capacity overflow evicts the earliest-inserted entry, regardless
//! of how recently it was read.
//!
//! Time comes from `tokio::time::Instant`, so paused-clock tests can step
//! across TTL boundaries exactly.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Deterministic fingerprint of an endpoint plus its normalized parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an already-normalized key.
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the cache key for `endpoint` called with `params`.
///
/// Parameters are serialized through `serde_json::Value`, whose object maps
/// are ordered, so field order never affects the key. Null and empty-string
/// values are dropped: an unset filter and an absent filter are the same request.
pub fn fingerprint<P: Serialize + ?Sized>(endpoint: &str, params: &P) -> CacheKey {
    let normalized = serde_json::to_value(params)
        .map(strip_empty)
        .unwrap_or(Value::Null);
    match normalized {
        Value::Null => CacheKey(endpoint.to_owned()),
        Value::Object(ref map) if map.is_empty() => CacheKey(endpoint.to_owned()),
        other => CacheKey(format!("{endpoint}:{other}")),
    }
}

fn strip_empty(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(String, Value)> = map
                .into_iter()
                .filter(|(_, v)| !matches!(v, Value::Null) && v.as_str() != Some(""))
                .map(|(k, v)| (k, strip_empty(v)))
                .collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(fields.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(strip_empty).collect()),
        other => other,
    }
}

/// Freshness and capacity settings for one surface's cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl CachePolicy {
    pub const fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { ttl, max_entries }
    }

    /// Genre list: rarely changes.
    pub const GENRES: Self = Self::new(Duration::from_secs(24 * 60 * 60), 30);
    /// Trending, popular, top-rated, upcoming, now-playing, by-genre.
    pub const LISTINGS: Self = Self::new(Duration::from_secs(10 * 60), 50);
    pub const DISCOVERY: Self = Self::new(Duration::from_secs(10 * 60), 30);
    pub const DETAILS: Self = Self::new(Duration::from_secs(20 * 60), 30);
    pub const STREAMING: Self = Self::new(Duration::from_secs(15 * 60), 50);
    pub const SEARCH: Self = Self::new(Duration::from_secs(10 * 60), 50);
}

/// A cached value and the moment it was written. Replaced wholesale on overwrite.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: CacheKey,
    pub value: V,
    pub written_at: Instant,
    /// How long after `written_at` the entry stays fresh. At most the policy TTL.
    pub lifetime: Duration,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self) -> bool {
        self.written_at.elapsed() < self.lifetime
    }
}

/// Shared, clone-cheap TTL cache with FIFO eviction.
#[derive(Clone)]
pub struct TtlCache<V> {
    name: &'static str,
    policy: CachePolicy,
    entries: Arc<Mutex<IndexMap<CacheKey, CacheEntry<V>>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(name: &'static str, policy: CachePolicy) -> Self {
        Self {
            name,
            policy,
            entries: Arc::new(Mutex::new(IndexMap::with_capacity(policy.max_entries))),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<CacheKey, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the value for `key` if it was written less than one TTL ago.
    /// An expired entry is removed as a side effect.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut entries = self.lock();
        let entry = entries.get(key)?;
        if entry.is_fresh() {
            trace!(cache = self.name, %key, "cache hit");
            return Some(entry.value.clone());
        }
        entries.shift_remove(key);
        trace!(cache = self.name, %key, "cache entry expired");
        None
    }

    /// Insert or overwrite `key`. A new key arriving at capacity evicts the
    /// earliest-inserted entry first; an overwrite keeps its original slot.
    pub fn set(&self, key: CacheKey, value: V) {
        self.insert(key, value, self.policy.ttl);
    }

    /// Insert a value that was produced `age` ago, e.g. restored from disk.
    /// It expires once its total age reaches the TTL; a value already that old
    /// is not stored and any existing entry for `key` is dropped.
    pub fn set_with_age(&self, key: CacheKey, value: V, age: Duration) {
        match self.policy.ttl.checked_sub(age).filter(|rest| !rest.is_zero()) {
            Some(remaining) => self.insert(key, value, remaining),
            None => {
                trace!(cache = self.name, %key, ?age, "restored value already expired");
                self.remove(&key);
            }
        }
    }

    fn insert(&self, key: CacheKey, value: V, lifetime: Duration) {
        let mut entries = self.lock();
        if !entries.contains_key(&key)
            && entries.len() >= self.policy.max_entries
            && let Some((evicted, _)) = entries.shift_remove_index(0)
        {
            trace!(cache = self.name, key = %evicted, "cache entry evicted");
        }
        let entry = CacheEntry {
            key: key.clone(),
            value,
            written_at: Instant::now(),
            lifetime,
        };
        entries.insert(key, entry);
    }

    pub fn remove(&self, key: &CacheKey) -> Option<V> {
        self.lock().shift_remove(key).map(|e| e.value)
    }

    /// Drop every entry whose key starts with `prefix`.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|k, _| !k.as_str().starts_with(prefix));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, including ones that have expired but not yet been read.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a fresh entry exists, without touching expired ones.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock()
            .get(key)
            .is_some_and(CacheEntry::is_fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    fn cache(ttl_secs: u64, max: usize) -> TtlCache<u32> {
        TtlCache::new("test", CachePolicy::new(Duration::from_secs(ttl_secs), max))
    }

    fn key(s: &str) -> CacheKey {
        CacheKey::raw(s)
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_until_ttl_then_miss() {
        let c = cache(600, 10);
        c.set(key("a"), 1);

        tokio::time::advance(Duration::from_secs(599)).await;
        assert_eq!(c.get(&key("a")), Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(c.get(&key("a")), None);
        // Lazy cleanup removed the stale entry.
        assert_eq!(c.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_evicts_earliest_inserted() {
        let c = cache(600, 3);
        c.set(key("a"), 1);
        c.set(key("b"), 2);
        c.set(key("c"), 3);

        // Reading "a" does not protect it: eviction is by insertion order.
        assert_eq!(c.get(&key("a")), Some(1));
        c.set(key("d"), 4);

        assert_eq!(c.len(), 3);
        assert_eq!(c.get(&key("a")), None);
        assert_eq!(c.get(&key("b")), Some(2));
        assert_eq!(c.get(&key("d")), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_does_not_evict() {
        let c = cache(600, 2);
        c.set(key("a"), 1);
        c.set(key("b"), 2);
        c.set(key("a"), 10);

        assert_eq!(c.len(), 2);
        assert_eq!(c.get(&key("a")), Some(10));
        assert_eq!(c.get(&key("b")), Some(2));

        // "a" kept its original slot, so it is still the oldest.
        c.set(key("c"), 3);
        assert_eq!(c.get(&key("a")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_refreshes_timestamp() {
        let c = cache(10, 4);
        c.set(key("a"), 1);
        tokio::time::advance(Duration::from_secs(8)).await;
        c.set(key("a"), 2);
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(c.get(&key("a")), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn aged_value_keeps_only_its_remaining_lifetime() {
        let c = cache(600, 4);
        c.set_with_age(key("a"), 1, Duration::from_secs(540));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(c.get(&key("a")), Some(1));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(c.get(&key("a")), None);

        // Too old to store at all, and it replaces nothing.
        c.set(key("b"), 2);
        c.set_with_age(key("b"), 3, Duration::from_secs(600));
        assert!(!c.contains(&key("b")));
        assert_eq!(c.len(), 0);
    }

    #[test]
    fn clear_and_prefix_removal() {
        let c = cache(600, 10);
        c.set(key("search:a"), 1);
        c.set(key("search:b"), 2);
        c.set(key("detail:1"), 3);
        assert_eq!(c.remove_prefix("search:"), 2);
        assert_eq!(c.len(), 1);
        c.clear();
        assert!(c.is_empty());
    }

    #[derive(Serialize)]
    struct AB {
        a: u32,
        b: Option<String>,
    }

    #[derive(Serialize)]
    struct BA {
        b: Option<String>,
        a: u32,
    }

    #[test]
    fn fingerprint_ignores_field_order_and_empties() {
        let x = fingerprint("discover", &AB { a: 1, b: None });
        let y = fingerprint("discover", &BA { b: Some(String::new()), a: 1 });
        assert_eq!(x, y);
        assert_eq!(x.as_str(), r#"discover:{"a":1}"#);

        let z = fingerprint("discover", &AB { a: 1, b: Some("x".into()) });
        assert_ne!(x, z);
    }

    #[test]
    fn fingerprint_without_params_is_endpoint() {
        assert_eq!(fingerprint("genres", &()).as_str(), "genres");
    }
}
