//! Upstream body cache
//!
//! Holds full upstream bodies that will be served in several slices. Each
//! entry carries two independent expiry clocks:
//!
//! - an inactivity timeout, reset on every access
//! - a hard lifetime from creation, never reset
//!
//! whichever runs out first evicts the entry. Bodies above the admission
//! limit are never stored. The entry count is bounded with LRU eviction.
//!
//! # Thread Safety
//!
//! State sits behind a `parking_lot::Mutex`; no lock is held across an await.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::ProxyConfig;

/// Cache policy
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub idle: Duration,
    pub lifetime: Duration,
    pub max_entry_bytes: usize,
    pub capacity: usize,
}

impl From<&ProxyConfig> for CachePolicy {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            idle: config.cache_idle,
            lifetime: config.cache_lifetime,
            max_entry_bytes: config.max_cache_entry_bytes,
            capacity: config.cache_capacity,
        }
    }
}

/// A cached upstream body
#[derive(Debug, Clone, PartialEq)]
pub struct CachedBody {
    pub data: Arc<[u8]>,
    pub content_type: Option<String>,
}

impl CachedBody {
    pub fn new(data: Vec<u8>, content_type: Option<String>) -> Self {
        Self {
            data: data.into(),
            content_type,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

struct CacheEntry {
    body: CachedBody,
    created_at: Instant,
    last_access: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant, policy: &CachePolicy) -> bool {
        now.duration_since(self.last_access) >= policy.idle
            || now.duration_since(self.created_at) >= policy.lifetime
    }
}

struct CacheInner {
    entries: LruCache<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
    rejected: u64,
}

/// Locator-keyed body cache with idle and lifetime expiry
#[derive(Clone)]
pub struct ByteCache {
    inner: Arc<Mutex<CacheInner>>,
    policy: CachePolicy,
}

impl ByteCache {
    pub fn new(policy: CachePolicy) -> Self {
        let capacity = NonZeroUsize::new(policy.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
                rejected: 0,
            })),
            policy,
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Look up a body, resetting its inactivity clock
    pub fn get(&self, locator: &str) -> Option<CachedBody> {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.get_mut(locator) {
            Some(entry) if !entry.is_expired(now, &self.policy) => {
                entry.last_access = now;
                let body = entry.body.clone();
                inner.hits += 1;
                return Some(body);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.entries.pop(locator);
            inner.evictions += 1;
            tracing::debug!(locator, "Cache entry expired");
        }
        inner.misses += 1;
        None
    }

    /// Store a body, replacing any previous entry for the locator
    ///
    /// Returns `false` when the body exceeds the admission limit.
    pub fn insert(&self, locator: &str, body: CachedBody) -> bool {
        if body.len() > self.policy.max_entry_bytes {
            let mut inner = self.inner.lock();
            inner.rejected += 1;
            tracing::debug!(
                locator,
                size = body.len(),
                limit = self.policy.max_entry_bytes,
                "Body too large to cache"
            );
            return false;
        }

        let now = Instant::now();
        let size = body.len();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let displaced = inner.entries.push(
            locator.to_string(),
            CacheEntry {
                body,
                created_at: now,
                last_access: now,
            },
        );
        if let Some((key, _)) = displaced {
            if key != locator {
                inner.evictions += 1;
                tracing::debug!(locator = %key, "Cache entry displaced by capacity");
            }
        }
        tracing::debug!(locator, size, "Cached upstream body");
        true
    }

    /// Drop an entry
    pub fn remove(&self, locator: &str) -> bool {
        self.inner.lock().entries.pop(locator).is_some()
    }

    /// Whether a live entry exists, without touching its clocks
    pub fn contains(&self, locator: &str) -> bool {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .entries
            .peek(locator)
            .map(|e| !e.is_expired(now, &self.policy))
            .unwrap_or(false)
    }

    /// Evict every expired entry, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now, &self.policy))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            inner.entries.pop(key);
        }
        inner.evictions += expired.len() as u64;

        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "Swept expired cache entries");
        }
        expired.len()
    }

    /// Start the background sweeper
    pub fn start_sweeper(self, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                self.sweep_expired();
            }
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            capacity: inner.entries.cap().get(),
            total_bytes: inner.entries.iter().map(|(_, e)| e.body.len()).sum(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            rejected: inner.rejected,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub total_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Bodies refused for being over the admission limit
    pub rejected: u64,
}
