//! Cache counters.
//!
//! Every outcome is counted twice: in process-local atomics (read by tests and
//! diagnostics) and through the `metrics` facade, labelled with the route name.
//! Neither path can fail a request.

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;

pub const METRIC_HIT: &str = "storegate_cache_hit_total";
pub const METRIC_MISS: &str = "storegate_cache_miss_total";
pub const METRIC_BYPASS: &str = "storegate_cache_bypass_total";
pub const METRIC_WRITE: &str = "storegate_cache_write_total";
pub const METRIC_STORE_ERROR: &str = "storegate_cache_store_error_total";
pub const METRIC_INVALIDATED: &str = "storegate_cache_invalidated_total";

/// Outcome counters for one caching filter.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    bypassed: AtomicU64,
    writes: AtomicU64,
    store_errors: AtomicU64,
    invalidated: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub bypassed: u64,
    pub writes: u64,
    pub store_errors: u64,
    pub invalidated: u64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, cache: &str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_HIT, "cache" => cache.to_string()).increment(1);
    }

    pub fn record_miss(&self, cache: &str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_MISS, "cache" => cache.to_string()).increment(1);
    }

    pub fn record_bypass(&self, cache: &str) {
        self.bypassed.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_BYPASS, "cache" => cache.to_string()).increment(1);
    }

    pub fn record_write(&self, cache: &str) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_WRITE, "cache" => cache.to_string()).increment(1);
    }

    pub fn record_store_error(&self, cache: &str, kind: &'static str) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_STORE_ERROR, "cache" => cache.to_string(), "kind" => kind).increment(1);
    }

    pub fn record_invalidated(&self, cache: &str, removed: u64) {
        self.invalidated.fetch_add(removed, Ordering::Relaxed);
        counter!(METRIC_INVALIDATED, "cache" => cache.to_string()).increment(removed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
        }
    }
}
