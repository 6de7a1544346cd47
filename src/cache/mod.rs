//! Resolution cache — bounded, TTL-based store for resolved references.
//!
//! Maps a normalized reference key to the [`ResolvedResult`] a previous
//! upstream lookup produced. Two independent removal policies apply,
//! whichever fires first:
//!
//! - **TTL expiry** — a read that finds an entry past its deadline deletes
//!   it and reports a miss (lazy expiry; no background sweeper).
//! - **LRU eviction** — inserting into a full cache evicts the entry whose
//!   recency stamp is oldest.
//!
//! All state lives behind one `std::sync::Mutex`; no lock is ever held
//! across an await point, so the blocking mutex is safe inside async tasks.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::resolver::ResolvedResult;

struct CacheEntry {
    value: ResolvedResult,
    inserted_at: Instant,
    expires_at: Instant,
    // Monotone recency stamp; the smallest stamp is the LRU victim.
    last_used: u64,
}

/// Thread-safe TTL + LRU cache for resolution results.
pub struct ResolutionCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    clock: u64,
}

impl ResolutionCache {
    /// Creates an empty cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                clock: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Looks up `key`, refreshing its recency on a hit.
    ///
    /// An expired entry is deleted on sight and treated as a miss, so a
    /// caller can never observe a value past its deadline.
    pub fn get(&self, key: &str) -> Option<ResolvedResult> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        let expired = match inner.entries.get(key) {
            Some(entry) => now >= entry.expires_at,
            None => return None,
        };
        if expired {
            inner.entries.remove(key);
            debug!(key, "cache entry expired");
            return None;
        }

        inner.clock += 1;
        let clock = inner.clock;
        let entry = inner.entries.get_mut(key)?;
        entry.last_used = clock;
        Some(entry.value.clone())
    }

    /// Inserts `value` under `key`, expiring after `ttl`.
    ///
    /// If the cache is full and `key` is not already present, the
    /// least-recently-used entry is evicted first.
    pub fn put(&self, key: &str, value: ResolvedResult, ttl: Duration) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        if !inner.entries.contains_key(key) && inner.entries.len() >= self.capacity {
            // Expired entries go first; only live entries compete on recency.
            inner.entries.retain(|_, e| now < e.expires_at);
            if inner.entries.len() >= self.capacity {
                let victim = inner
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(k, _)| k.clone());
                if let Some(victim) = victim {
                    inner.entries.remove(&victim);
                    debug!(key = %victim, "evicted least-recently-used cache entry");
                }
            }
        }

        inner.clock += 1;
        let last_used = inner.clock;
        inner.entries.insert(
            key.to_owned(),
            CacheEntry {
                value,
                inserted_at: now,
                expires_at: now + ttl,
                last_used,
            },
        );
    }

    /// Number of live entries, expired-but-unswept ones included.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry. Used by the engine's test-isolation reset.
    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .clear();
    }

    /// Age of the entry under `key`, if present. Exposed for diagnostics.
    pub fn entry_age(&self, key: &str) -> Option<Duration> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .entries
            .get(key)
            .map(|e| Instant::now().duration_since(e.inserted_at))
    }
}
