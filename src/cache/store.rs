//! In-memory TTL cache store.
//!
//! The shipped [`CacheStore`] implementation. Entries carry an
//! expiry instant; expired entries are treated as absent on read and
//! physically removed by [`MemoryStore::purge_expired`] or when
//! overwritten.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::models::AnalysisResult;

/// Errors from a cache backing store.
///
/// The engine swallows all of these; they exist so alternative stores
/// (and the failing store used in tests) can report unreachability.
#[derive(Error, Debug)]
pub enum CacheStoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

/// A cached result plus its expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: AnalysisResult,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn new(result: AnalysisResult, ttl: Duration) -> Self {
        Self {
            result,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Backing store for the result cache.
///
/// Implementations must be internally thread-safe; the engine shares
/// one store across all concurrent requests.
pub trait CacheStore: Send + Sync {
    /// Fetch an entry. Expired entries must read as `None`.
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError>;

    /// Insert or overwrite an entry.
    fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheStoreError>;

    /// Remove every entry whose key starts with `prefix`; returns how
    /// many were removed.
    fn remove_prefix(&self, prefix: &str) -> Result<usize, CacheStoreError>;

    /// Drop expired entries; returns how many were removed.
    fn purge_expired(&self) -> Result<usize, CacheStoreError>;

    /// Remove all entries; returns how many were removed.
    fn clear(&self) -> Result<usize, CacheStoreError>;

    /// Number of live (unexpired) entries.
    fn len(&self) -> Result<usize, CacheStoreError>;
}

/// The default in-process store: a read-write-locked map.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError> {
        let entries = self.entries.read().expect("cache lock poisoned");
        Ok(entries.get(key).filter(|e| !e.is_expired()).cloned())
    }

    fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheStoreError> {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn remove_prefix(&self, prefix: &str) -> Result<usize, CacheStoreError> {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok(before - entries.len())
    }

    fn purge_expired(&self) -> Result<usize, CacheStoreError> {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired());
        Ok(before - entries.len())
    }

    fn clear(&self) -> Result<usize, CacheStoreError> {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        let count = entries.len();
        entries.clear();
        Ok(count)
    }

    fn len(&self) -> Result<usize, CacheStoreError> {
        let entries = self.entries.read().expect("cache lock poisoned");
        Ok(entries.values().filter(|e| !e.is_expired()).count())
    }
}
