//! Fingerprint-keyed result cache.
//!
//! The fast tier of the pipeline: a TTL key-value layer in front of
//! the upstream analyzer. The cache is an optimization, never a
//! correctness dependency: every store failure is swallowed, logged,
//! and treated as a miss, so an unreachable backing store degrades the
//! pipeline to "no cache" behavior instead of failing requests.

pub mod store;

use std::time::Duration;

use crate::fingerprint::Fingerprint;
use crate::models::AnalysisResult;
use crate::telemetry::{self, PipelineEvent};

pub use store::{CacheEntry, CacheStore, CacheStoreError, MemoryStore};

/// Compute the store key for a user/fingerprint pair.
///
/// The `{user}:` prefix makes per-user invalidation a prefix removal.
/// Key format is an internal contract; callers never see it.
fn cache_key(user_id: &str, fingerprint: &Fingerprint) -> String {
    format!("{user_id}:{fingerprint}")
}

/// The result cache engine.
pub struct CacheEngine {
    enabled: bool,
    default_ttl: Duration,
    store: Box<dyn CacheStore>,
}

impl CacheEngine {
    /// Create an engine over the in-memory store.
    pub fn new(enabled: bool, default_ttl: Duration) -> Self {
        Self::with_store(enabled, default_ttl, Box::new(MemoryStore::new()))
    }

    /// Create an engine over a specific backing store.
    pub fn with_store(enabled: bool, default_ttl: Duration, store: Box<dyn CacheStore>) -> Self {
        Self {
            enabled,
            default_ttl,
            store,
        }
    }

    /// Look up a cached result. Returns `None` on miss, expiry,
    /// disabled cache, or store failure.
    pub fn get(&self, user_id: &str, fingerprint: &Fingerprint) -> Option<AnalysisResult> {
        if !self.enabled {
            return None;
        }
        let key = cache_key(user_id, fingerprint);
        match self.store.get(&key) {
            Ok(Some(entry)) => {
                telemetry::emit(PipelineEvent::CacheHit {
                    fingerprint: fingerprint.as_str(),
                });
                Some(entry.result)
            }
            Ok(None) => {
                telemetry::emit(PipelineEvent::CacheMiss {
                    fingerprint: fingerprint.as_str(),
                });
                None
            }
            Err(e) => {
                telemetry::emit(PipelineEvent::StoreError {
                    operation: "cache.get",
                    detail: &e.to_string(),
                });
                None
            }
        }
    }

    /// Store a result under the default TTL.
    pub fn put(&self, user_id: &str, fingerprint: &Fingerprint, result: &AnalysisResult) {
        self.put_with_ttl(user_id, fingerprint, result, self.default_ttl);
    }

    /// Store a result under an explicit TTL. Idempotent; a later put
    /// for the same key overwrites.
    pub fn put_with_ttl(
        &self,
        user_id: &str,
        fingerprint: &Fingerprint,
        result: &AnalysisResult,
        ttl: Duration,
    ) {
        if !self.enabled {
            return;
        }
        let key = cache_key(user_id, fingerprint);
        let entry = CacheEntry::new(result.clone().untagged(), ttl);
        if let Err(e) = self.store.put(&key, entry) {
            telemetry::emit(PipelineEvent::StoreError {
                operation: "cache.put",
                detail: &e.to_string(),
            });
        }
    }

    /// Remove every entry belonging to a user. Used after suggestion
    /// feedback, which makes the user's cached results stale.
    pub fn invalidate_user(&self, user_id: &str) -> usize {
        if !self.enabled {
            return 0;
        }
        match self.store.remove_prefix(&format!("{user_id}:")) {
            Ok(n) => n,
            Err(e) => {
                telemetry::emit(PipelineEvent::StoreError {
                    operation: "cache.invalidate_user",
                    detail: &e.to_string(),
                });
                0
            }
        }
    }

    /// Remove all cached entries; returns how many were removed.
    pub fn clear(&self) -> usize {
        self.store.clear().unwrap_or(0)
    }

    /// Number of live entries (0 if the store is unreachable).
    pub fn len(&self) -> usize {
        self.store.len().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint;
    use crate::models::{AnalysisResult, CodeMetrics};
    use indexmap::IndexMap;

    fn sample_result(score: u8) -> AnalysisResult {
        AnalysisResult {
            quality_score: score,
            suggestions: vec![],
            patterns: vec![],
            security_issues: vec![],
            metrics: CodeMetrics::default(),
            analyzed_by_upstream: true,
            is_fallback: false,
            fallback_reason: None,
            computed_at_millis: crate::models::result::now_millis(),
            from_cache: false,
            from_database: false,
        }
    }

    fn fp(content: &str) -> Fingerprint {
        fingerprint::fingerprint(content, "a.js", "u1", &IndexMap::new())
    }

    /// A store that fails every operation, for fail-open tests.
    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheStoreError> {
            Err(CacheStoreError::Unavailable("connection refused".into()))
        }
        fn put(&self, _key: &str, _entry: CacheEntry) -> Result<(), CacheStoreError> {
            Err(CacheStoreError::Unavailable("connection refused".into()))
        }
        fn remove_prefix(&self, _prefix: &str) -> Result<usize, CacheStoreError> {
            Err(CacheStoreError::Unavailable("connection refused".into()))
        }
        fn purge_expired(&self) -> Result<usize, CacheStoreError> {
            Err(CacheStoreError::Unavailable("connection refused".into()))
        }
        fn clear(&self) -> Result<usize, CacheStoreError> {
            Err(CacheStoreError::Unavailable("connection refused".into()))
        }
        fn len(&self) -> Result<usize, CacheStoreError> {
            Err(CacheStoreError::Unavailable("connection refused".into()))
        }
    }

    #[test]
    fn put_then_get() {
        let cache = CacheEngine::new(true, Duration::from_secs(60));
        let fp = fp("content");
        cache.put("u1", &fp, &sample_result(88));
        let hit = cache.get("u1", &fp).expect("should hit");
        assert_eq!(hit.quality_score, 88);
    }

    #[test]
    fn miss_for_other_user() {
        let cache = CacheEngine::new(true, Duration::from_secs(60));
        let fp = fp("content");
        cache.put("u1", &fp, &sample_result(88));
        assert!(cache.get("u2", &fp).is_none());
    }

    #[test]
    fn disabled_cache_never_hits() {
        let cache = CacheEngine::new(false, Duration::from_secs(60));
        let fp = fp("content");
        cache.put("u1", &fp, &sample_result(88));
        assert!(cache.get("u1", &fp).is_none());
        assert_eq!(cache.invalidate_user("u1"), 0);
    }

    #[test]
    fn short_ttl_expires() {
        let cache = CacheEngine::new(true, Duration::from_secs(60));
        let fp = fp("content");
        cache.put_with_ttl("u1", &fp, &sample_result(88), Duration::from_secs(0));
        assert!(cache.get("u1", &fp).is_none());
    }

    #[test]
    fn invalidate_user_removes_only_that_user() {
        let cache = CacheEngine::new(true, Duration::from_secs(60));
        let fp_a = fp("a");
        let fp_b = fp("b");
        cache.put("u1", &fp_a, &sample_result(1));
        cache.put("u1", &fp_b, &sample_result(2));
        cache.put("u2", &fp_a, &sample_result(3));
        assert_eq!(cache.invalidate_user("u1"), 2);
        assert!(cache.get("u1", &fp_a).is_none());
        assert!(cache.get("u2", &fp_a).is_some());
    }

    #[test]
    fn cached_results_are_stored_untagged() {
        let cache = CacheEngine::new(true, Duration::from_secs(60));
        let fp = fp("content");
        cache.put("u1", &fp, &sample_result(88).tagged_from_database());
        let hit = cache.get("u1", &fp).unwrap();
        assert!(!hit.from_database);
        assert!(!hit.from_cache);
    }

    #[test]
    fn broken_store_fails_open() {
        let cache =
            CacheEngine::with_store(true, Duration::from_secs(60), Box::new(BrokenStore));
        let fp = fp("content");
        // None of these should panic or surface errors.
        cache.put("u1", &fp, &sample_result(88));
        assert!(cache.get("u1", &fp).is_none());
        assert_eq!(cache.invalidate_user("u1"), 0);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.clear(), 0);
    }
}
