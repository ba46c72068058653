//! Adaptive per-source listing cache.
//!
//! TTLs adapt to how healthy a source has been: reliable sources keep their
//! listings around longer, flaky sources get short TTLs so recovery is
//! noticed quickly. Expired entries are kept for a stale grace window and
//! served marked as stale when the source is failing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::listing::NormalizedListing;
use crate::source::SourceId;

/// TTL tiers and the stale grace window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub base_ttl: Duration,
    pub min_ttl: Duration,
    pub max_ttl: Duration,
    /// Expired entries remain servable (flagged stale) for this long past
    /// their TTL before they are dropped entirely.
    pub stale_grace: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_ttl: Duration::from_secs(30),
            min_ttl: Duration::from_secs(10),
            max_ttl: Duration::from_secs(300),
            stale_grace: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    /// TTL tier for a source with the given rolling success rate.
    pub fn ttl_for(&self, success_rate: f64) -> Duration {
        if success_rate >= 0.9 {
            self.max_ttl
        } else if success_rate >= 0.7 {
            self.base_ttl.mul_f64(1.5).min(self.max_ttl)
        } else if success_rate >= 0.5 {
            self.base_ttl
        } else {
            self.min_ttl
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    listings: Arc<Vec<NormalizedListing>>,
    inserted_at: Instant,
    ttl: Duration,
}

#[derive(Debug, Default, Clone, Copy)]
struct SourceCounters {
    hits: u64,
    stale_hits: u64,
    misses: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<SourceId, CacheEntry>,
    counters: HashMap<SourceId, SourceCounters>,
}

/// A cache lookup result with its freshness flag.
#[derive(Debug, Clone)]
pub struct CachedListings {
    pub listings: Arc<Vec<NormalizedListing>>,
    pub stale: bool,
    pub age: Duration,
}

/// Per-source cache statistics for the ops surface.
#[derive(Debug, Clone, Serialize)]
pub struct SourceCacheStats {
    pub source: SourceId,
    pub cached: bool,
    pub entry_count: usize,
    pub ttl_seconds: Option<f64>,
    pub age_seconds: Option<f64>,
    pub hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub sources: Vec<SourceCacheStats>,
    pub total_hits: u64,
    pub total_stale_hits: u64,
    pub total_misses: u64,
    pub hit_rate: f64,
}

/// Success-rate-aware listing cache, one entry per source.
#[derive(Debug, Default)]
pub struct AdaptiveCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
}

impl AdaptiveCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Store listings for `source`, picking the TTL tier from the source's
    /// current success rate.
    pub fn set(&self, source: SourceId, listings: Vec<NormalizedListing>, success_rate: f64) {
        let ttl = self.config.ttl_for(success_rate);
        let mut inner = self.inner.lock().expect("cache lock is not poisoned");
        inner.entries.insert(
            source,
            CacheEntry {
                listings: Arc::new(listings),
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Fetch listings for `source` if they are fresh. Expired-but-in-grace
    /// entries miss here; use [`get_allow_stale`](Self::get_allow_stale)
    /// when serving through an outage.
    pub fn get(&self, source: SourceId) -> Option<CachedListings> {
        self.lookup(source, false)
    }

    /// Fetch listings for `source`, accepting entries past their TTL as long
    /// as they are still within the stale grace window.
    pub fn get_allow_stale(&self, source: SourceId) -> Option<CachedListings> {
        self.lookup(source, true)
    }

    fn lookup(&self, source: SourceId, allow_stale: bool) -> Option<CachedListings> {
        let mut inner = self.inner.lock().expect("cache lock is not poisoned");

        let (result, expired) = match inner.entries.get(&source) {
            None => (None, false),
            Some(entry) => {
                let age = entry.inserted_at.elapsed();
                if age <= entry.ttl {
                    (
                        Some(CachedListings {
                            listings: Arc::clone(&entry.listings),
                            stale: false,
                            age,
                        }),
                        false,
                    )
                } else if age <= entry.ttl + self.config.stale_grace {
                    if allow_stale {
                        (
                            Some(CachedListings {
                                listings: Arc::clone(&entry.listings),
                                stale: true,
                                age,
                            }),
                            false,
                        )
                    } else {
                        (None, false)
                    }
                } else {
                    (None, true)
                }
            }
        };

        if expired {
            inner.entries.remove(&source);
        }

        let counters = inner.counters.entry(source).or_default();
        match &result {
            Some(cached) if cached.stale => counters.stale_hits += 1,
            Some(_) => counters.hits += 1,
            None => counters.misses += 1,
        }

        result
    }

    /// Drop the entry for one source. Idempotent.
    pub fn invalidate(&self, source: SourceId) {
        let mut inner = self.inner.lock().expect("cache lock is not poisoned");
        inner.entries.remove(&source);
    }

    /// Drop every entry. Idempotent.
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.lock().expect("cache lock is not poisoned");
        inner.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache lock is not poisoned");

        let mut sources = Vec::with_capacity(SourceId::ALL.len());
        let mut total_hits = 0;
        let mut total_stale_hits = 0;
        let mut total_misses = 0;

        for source in SourceId::ALL {
            let counters = inner.counters.get(&source).copied().unwrap_or_default();
            total_hits += counters.hits;
            total_stale_hits += counters.stale_hits;
            total_misses += counters.misses;

            let entry = inner.entries.get(&source);
            sources.push(SourceCacheStats {
                source,
                cached: entry.is_some(),
                entry_count: entry.map(|e| e.listings.len()).unwrap_or(0),
                ttl_seconds: entry.map(|e| e.ttl.as_secs_f64()),
                age_seconds: entry.map(|e| e.inserted_at.elapsed().as_secs_f64()),
                hits: counters.hits,
                stale_hits: counters.stale_hits,
                misses: counters.misses,
            });
        }

        let lookups = total_hits + total_stale_hits + total_misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            (total_hits + total_stale_hits) as f64 / lookups as f64
        };

        CacheStats {
            sources,
            total_hits,
            total_stale_hits,
            total_misses,
            hit_rate,
        }
    }
}
