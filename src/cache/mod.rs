//! Gateway response cache.
//!
//! Cache-aside filtering for proxied routes:
//!
//! - **Policy** decides which requests take part (method whitelist, path predicate)
//! - **Keys** derive a stable, store-safe key from the request URI
//! - **Capture** tees a successful downstream body into the store
//! - **Invalidation** drops a key namespace, on demand or after writes
//!
//! ## Configuration
//!
//! Each proxied route may carry its own cache section:
//!
//! ```toml
//! [[routes]]
//! name = "products"
//! path = "/api/products"
//! upstream = "http://127.0.0.1:8083"
//!
//! [routes.cache]
//! key_prefix = "products:cache:"
//! ttl_seconds = 600
//! # ... see config.rs for all options
//! ```

mod capture;
mod config;
mod invalidation;
mod keys;
mod memory;
mod middleware;
mod policy;
mod redis_store;
mod stats;
mod store;

pub use capture::{CaptureTarget, HIT, MISS, X_CACHE, capture, mark_miss};
pub use config::{
    DEFAULT_MAX_BODY_BYTES, DEFAULT_OPERATION_TIMEOUT, DEFAULT_TTL, RouteCacheConfig,
};
pub use invalidation::{Invalidator, invalidate_on_write};
pub use keys::{CacheKey, KeyStrategy, sanitize};
pub use memory::MemoryStore;
pub use middleware::{CacheState, response_cache_layer};
pub use policy::{CacheabilityPolicy, MAX_CACHEABLE_PATH_LEN, PathPredicate};
pub use redis_store::RedisStore;
pub use stats::{
    CacheStats, CacheStatsSnapshot, METRIC_BYPASS, METRIC_HIT, METRIC_INVALIDATED, METRIC_MISS,
    METRIC_STORE_ERROR, METRIC_WRITE,
};
pub use store::{CacheStore, StoreError, bounded, connect};
