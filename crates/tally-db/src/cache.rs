//! # Query Cache
//!
//! Short-lived cache over analytics results, keyed by query signature.
//!
//! ## Invalidation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every committed ledger write calls invalidate_all().                   │
//! │                                                                         │
//! │  Reader                              Writer                             │
//! │  ──────                              ──────                             │
//! │  gen = cache.generation()   (= 4)                                       │
//! │  run query on snapshot ...           COMMIT                             │
//! │                                      invalidate_all()  gen → 5, clear   │
//! │  cache.insert(key, rows, gen=4)                                         │
//! │     └── 4 != 5: dropped, a stale snapshot never lands in the cache      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Values are stored as JSON strings, so any `Serialize` row type can be
//! cached without the cache knowing about it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    inserted_at: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: String, ttl: Duration) -> Self {
        let now = Instant::now();
        CacheEntry {
            value,
            inserted_at: now,
            expires_at: now + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Bounded TTL cache with whole-cache invalidation.
#[derive(Debug, Clone)]
pub struct QueryCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
    generation: Arc<AtomicU64>,
    ttl: Duration,
    max_entries: usize,
    enabled: bool,
}

impl QueryCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        QueryCache {
            store: Arc::new(RwLock::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            ttl,
            max_entries,
            enabled: max_entries > 0,
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        QueryCache {
            enabled: false,
            ..QueryCache::new(Duration::ZERO, 0)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current invalidation generation. Read it before running the query
    /// whose result will be inserted.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Returns a cached value, dropping it if expired or undecodable.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.enabled {
            return None;
        }

        let decoded = {
            let store = self.store.read().await;
            let entry = store.get(key)?;
            if entry.is_expired() {
                None
            } else {
                Some(serde_json::from_str::<T>(&entry.value))
            }
        };

        match decoded {
            Some(Ok(value)) => {
                debug!(key, "Query cache hit");
                Some(value)
            }
            Some(Err(e)) => {
                warn!(key, error = %e, "Dropping undecodable cache entry");
                self.store.write().await.remove(key);
                None
            }
            None => {
                self.store.write().await.remove(key);
                None
            }
        }
    }

    /// Stores a value computed while `generation` was current.
    ///
    /// Returns false when the value was not stored: caching disabled, or a
    /// commit invalidated the cache since `generation` was read.
    pub async fn insert<T: Serialize>(&self, key: &str, value: &T, generation: u64) -> bool {
        if !self.enabled {
            return false;
        }

        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode value for query cache");
                return false;
            }
        };

        let mut store = self.store.write().await;
        if self.generation.load(Ordering::Acquire) != generation {
            debug!(key, "Discarding result computed before the last commit");
            return false;
        }

        if !store.contains_key(key) && store.len() >= self.max_entries {
            Self::evict(&mut store);
        }
        store.insert(key.to_string(), CacheEntry::new(encoded, self.ttl));
        true
    }

    /// Drops expired entries, then the oldest one if still full.
    fn evict(store: &mut HashMap<String, CacheEntry>) {
        store.retain(|_, entry| !entry.is_expired());
        let oldest = store
            .iter()
            .min_by_key(|(_, entry)| entry.inserted_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            store.remove(&key);
        }
    }

    /// Returns the cached value for `key` or loads, caches and returns it.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &str, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            return Ok(hit);
        }
        let generation = self.generation();
        let value = load().await?;
        self.insert(key, &value, generation).await;
        Ok(value)
    }

    /// Invalidates everything. Called after every committed ledger write.
    pub async fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let mut store = self.store.write().await;
        if !store.is_empty() {
            debug!(entries = store.len(), "Invalidating query cache");
            store.clear();
        }
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
