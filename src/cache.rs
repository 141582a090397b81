use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Response class determining default TTL and cache directives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheClass {
    List,
    Read,
    Config,
    Static,
    /// Never cached, always executes the handler.
    #[default]
    Dynamic,
}

impl CacheClass {
    pub fn cacheable(&self) -> bool {
        !matches!(self, CacheClass::Dynamic)
    }

    /// Server-side TTL applied when the policy carries no explicit max_age.
    pub fn default_ttl(&self) -> Option<Duration> {
        match self {
            CacheClass::List => Some(Duration::from_secs(30)),
            CacheClass::Read => Some(Duration::from_secs(60)),
            CacheClass::Config => Some(Duration::from_secs(300)),
            CacheClass::Static => Some(Duration::from_secs(3600)),
            CacheClass::Dynamic => None,
        }
    }

    /// `Cache-Control` directive emitted on responses of this class.
    /// Accounting data is per-user, so only static assets are public.
    pub fn cache_control(&self) -> &'static str {
        match self {
            CacheClass::List => "private, max-age=30",
            CacheClass::Read => "private, max-age=60",
            CacheClass::Config => "private, max-age=300",
            CacheClass::Static => "public, max-age=3600, immutable",
            CacheClass::Dynamic => "no-store",
        }
    }

    /// `CDN-Cache-Control` directive. Shared caches must not hold
    /// private classes.
    pub fn cdn_cache_control(&self) -> &'static str {
        match self {
            CacheClass::Static => "max-age=3600",
            _ => "no-store",
        }
    }
}

struct Entry<T> {
    value: T,
    stored_at: Instant,
    ttl: Duration,
}

/// A cache read that found a live entry.
#[derive(Debug, Clone)]
pub struct CacheHit<T> {
    pub value: T,
    pub age: Duration,
}

/// Key-value store with per-entry TTL, checked lazily at read time.
///
/// An expired entry behaves as a miss and is removed by the lookup that
/// finds it; there is no background sweeper. Invalidation after writes is
/// the caller's responsibility, the cache has no knowledge of which
/// writes affect which reads.
pub struct TtlCache<T: Clone> {
    entries: DashMap<String, Entry<T>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<CacheHit<T>> {
        if let Some(entry) = self.entries.get(key) {
            let age = entry.stored_at.elapsed();
            if age <= entry.ttl {
                return Some(CacheHit {
                    value: entry.value.clone(),
                    age,
                });
            }
            drop(entry);
            self.entries.remove(key);
        }
        None
    }

    pub fn put(&self, key: &str, value: T, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Clone> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn put_then_get_is_a_hit() {
        let cache = TtlCache::new();
        cache.put("GET /api/items", "body".to_string(), Duration::from_secs(30));

        let hit = cache.get("GET /api/items").unwrap();
        assert_eq!(hit.value, "body");
        assert!(hit.age < Duration::from_secs(1));
    }

    #[test]
    fn expired_entry_is_a_miss_and_stays_gone() {
        let cache = TtlCache::new();
        cache.put("key", 1u32, Duration::from_millis(20));

        thread::sleep(Duration::from_millis(40));

        assert!(cache.get("key").is_none());
        // A second lookup must not resurrect the entry.
        assert!(cache.get("key").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn invalidate_and_clear() {
        let cache = TtlCache::new();
        cache.put("a", 1u32, Duration::from_secs(60));
        cache.put("b", 2u32, Duration::from_secs(60));

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert!(cache.get("a").is_none());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn overwrite_refreshes_ttl() {
        let cache = TtlCache::new();
        cache.put("key", 1u32, Duration::from_millis(20));
        thread::sleep(Duration::from_millis(15));
        cache.put("key", 2u32, Duration::from_millis(20));
        thread::sleep(Duration::from_millis(10));

        assert_eq!(cache.get("key").unwrap().value, 2);
    }

    #[test]
    fn dynamic_class_is_never_cacheable() {
        assert!(!CacheClass::Dynamic.cacheable());
        assert_eq!(CacheClass::Dynamic.default_ttl(), None);
        assert_eq!(CacheClass::Dynamic.cache_control(), "no-store");
    }

    #[test]
    fn class_directives() {
        assert_eq!(CacheClass::List.cache_control(), "private, max-age=30");
        assert_eq!(CacheClass::Static.cdn_cache_control(), "max-age=3600");
        assert_eq!(CacheClass::Read.cdn_cache_control(), "no-store");
        assert_eq!(
            CacheClass::Config.default_ttl(),
            Some(Duration::from_secs(300))
        );
    }
}
