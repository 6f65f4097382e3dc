//! Bounded LRU query cache
//!
//! Entries are keyed by a fingerprint over the canonicalized query, the
//! target dialect, the optimization level, the backend identity, and the
//! user id - so no two users ever share an entry. `get` returns a copy
//! with `cache_hit` set and the caller's session and trace substituted.
//! Eviction is strict LRU at capacity; all operations are thread-safe.

use saiql_core::{Dialect, OptimizationLevel, QueryResult, SessionId, TraceId};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Deterministic cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// SHA-256 over the canonical field tuple. Field order is fixed;
    /// every component is length-prefixed by the separator scheme below
    /// so no two tuples collide textually.
    pub fn compute(
        query: &str,
        dialect: Dialect,
        level: OptimizationLevel,
        backend_identity: &str,
        user_id: Option<&str>,
    ) -> Self {
        let mut hasher = Sha256::new();
        for part in [
            query,
            dialect.as_str(),
            level.as_str(),
            backend_identity,
            user_id.unwrap_or(""),
        ] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let requests = self.hits + self.misses;
        if requests == 0 {
            0.0
        } else {
            self.hits as f64 / requests as f64
        }
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, QueryResult>,
    /// Recency order, least-recent at the front.
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheInner {
    fn touch(&mut self, key: &str) {
        if let Some(position) = self.order.iter().position(|k| k == key) {
            self.order.remove(position);
        }
        self.order.push_back(key.to_string());
    }
}

/// Thread-safe bounded LRU mapping fingerprint → query result.
pub struct QueryCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity,
        }
    }

    fn inner(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch a copy of the cached result, substituting the caller's
    /// session and trace ids and marking it a cache hit.
    pub fn get(
        &self,
        key: &Fingerprint,
        session_id: SessionId,
        trace_id: TraceId,
    ) -> Option<QueryResult> {
        let mut inner = self.inner();
        match inner.entries.get(key.as_str()).cloned() {
            Some(mut result) => {
                inner.touch(key.as_str());
                inner.hits += 1;
                result.cache_hit = true;
                result.session_id = session_id;
                result.trace_id = trace_id;
                Some(result)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Store a result, evicting the least-recently-used entry at
    /// capacity.
    pub fn put(&self, key: &Fingerprint, result: QueryResult) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner();
        if inner.entries.insert(key.as_str().to_string(), result).is_none()
            && inner.entries.len() > self.capacity
        {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
                inner.evictions += 1;
            }
        }
        inner.touch(key.as_str());
    }

    pub fn clear(&self) {
        let mut inner = self.inner();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            size: inner.entries.len(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_for(query: &str) -> QueryResult {
        QueryResult::pending(query, SessionId::now_v7(), TraceId::new_v4())
    }

    fn key(query: &str, user: Option<&str>) -> Fingerprint {
        Fingerprint::compute(
            query,
            Dialect::Sqlite,
            OptimizationLevel::Standard,
            "memory:test",
            user,
        )
    }

    #[test]
    fn test_hit_substitutes_session_and_trace() {
        let cache = QueryCache::new(10);
        let fingerprint = key("*3[users]::*>>oQ", Some("ada"));
        cache.put(&fingerprint, result_for("*3[users]::*>>oQ"));

        let session = SessionId::now_v7();
        let trace = TraceId::new_v4();
        let hit = cache
            .get(&fingerprint, session, trace)
            .expect("entry should be cached");
        assert!(hit.cache_hit);
        assert_eq!(hit.session_id, session);
        assert_eq!(hit.trace_id, trace);
    }

    #[test]
    fn test_distinct_users_never_share_entries() {
        let ada = key("*3[users]::*>>oQ", Some("ada"));
        let lin = key("*3[users]::*>>oQ", Some("lin"));
        assert_ne!(ada, lin);

        let cache = QueryCache::new(10);
        cache.put(&ada, result_for("*3[users]::*>>oQ"));
        assert!(cache
            .get(&lin, SessionId::now_v7(), TraceId::new_v4())
            .is_none());
    }

    #[test]
    fn test_fingerprint_varies_by_dialect_and_level() {
        let base = key("q", None);
        let other_dialect = Fingerprint::compute(
            "q",
            Dialect::MySql,
            OptimizationLevel::Standard,
            "memory:test",
            None,
        );
        let other_level = Fingerprint::compute(
            "q",
            Dialect::Sqlite,
            OptimizationLevel::None,
            "memory:test",
            None,
        );
        assert_ne!(base, other_dialect);
        assert_ne!(base, other_level);
    }

    #[test]
    fn test_strict_lru_eviction() {
        let cache = QueryCache::new(2);
        let (a, b, c) = (key("a", None), key("b", None), key("c", None));
        cache.put(&a, result_for("a"));
        cache.put(&b, result_for("b"));

        // Touch `a` so `b` becomes the LRU entry.
        let sid = SessionId::now_v7();
        assert!(cache.get(&a, sid, TraceId::new_v4()).is_some());

        cache.put(&c, result_for("c"));
        assert!(cache.get(&b, sid, TraceId::new_v4()).is_none());
        assert!(cache.get(&a, sid, TraceId::new_v4()).is_some());
        assert!(cache.get(&c, sid, TraceId::new_v4()).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let cache = QueryCache::new(2);
        let a = key("a", None);
        let sid = SessionId::now_v7();
        assert!(cache.get(&a, sid, TraceId::new_v4()).is_none());
        cache.put(&a, result_for("a"));
        assert!(cache.get(&a, sid, TraceId::new_v4()).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }
}
