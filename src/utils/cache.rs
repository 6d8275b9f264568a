//! Key-Value Store Module
//!
//! Injected storage for everything that outlives a single request: circuit
//! breaker state, persisted verdicts, share-id cache entries and stored
//! simulations.
//!
//! `MemoryStore` is the in-process implementation:
//! - TTL-based expiration per entry
//! - Atomic compare-and-set via DashMap's entry API
//! - Cache HIT/MISS counters

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::models::errors::{GuardianError, GuardianResult};

/// Storage backend with per-key TTL
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Value under `key`, `None` if absent or expired
    async fn get(&self, key: &str) -> GuardianResult<Option<String>>;

    /// Unconditionally store `value` for `ttl`
    async fn set(&self, key: &str, value: String, ttl: Duration) -> GuardianResult<()>;

    async fn delete(&self, key: &str) -> GuardianResult<()>;

    /// Store `value` only if the current value equals `expected`
    /// (`None` meaning absent). Returns whether the swap happened.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: String,
        ttl: Duration,
    ) -> GuardianResult<bool>;

    /// Live keys starting with `prefix`
    async fn keys_with_prefix(&self, prefix: &str) -> GuardianResult<Vec<String>>;
}

/// Read and deserialize a JSON value
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> GuardianResult<Option<T>> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| GuardianError::store_corrupt(key, e)),
        None => Ok(None),
    }
}

/// Serialize and store a JSON value
pub async fn set_json<T: Serialize>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> GuardianResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, raw, ttl).await
}

/// Cache entry with its own deadline
#[derive(Clone, Debug)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory `KvStore` backed by DashMap
#[derive(Clone, Default)]
pub struct MemoryStore {
    store: Arc<DashMap<String, CacheEntry>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired());
        let removed = before - self.store.len();
        if removed > 0 {
            info!("🧹 STORE CLEANUP: {} expired entries removed", removed);
        }
        removed
    }

    pub fn stats(&self) -> StoreStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        StoreStats {
            entries: self.store.len(),
            hits,
            misses,
            hit_rate: if total > 0 {
                (hits as f64 / total as f64) * 100.0
            } else {
                0.0
            },
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> GuardianResult<Option<String>> {
        if let Some(entry) = self.store.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.store.remove_if(key, |_, e| e.is_expired());
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("📭 STORE MISS (expired): {}", key);
                Ok(None)
            } else {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("✅ STORE HIT: {}", key);
                Ok(Some(entry.value.clone()))
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("📭 STORE MISS: {}", key);
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> GuardianResult<()> {
        self.store.insert(key.to_string(), CacheEntry::new(value, ttl));
        debug!("💾 STORE SET: {} (TTL: {}s)", key, ttl.as_secs());
        Ok(())
    }

    async fn delete(&self, key: &str) -> GuardianResult<()> {
        self.store.remove(key);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: String,
        ttl: Duration,
    ) -> GuardianResult<bool> {
        match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current_matches = {
                    let current = occupied.get();
                    let current = if current.is_expired() {
                        None
                    } else {
                        Some(current.value.as_str())
                    };
                    current == expected
                };
                if current_matches {
                    occupied.insert(CacheEntry::new(value, ttl));
                }
                Ok(current_matches)
            }
            Entry::Vacant(vacant) => {
                if expected.is_none() {
                    vacant.insert(CacheEntry::new(value, ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> GuardianResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .store
            .iter()
            .filter(|e| e.key().starts_with(prefix) && !e.value().is_expired())
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Store statistics for monitoring
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}
