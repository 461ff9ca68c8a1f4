//! Per-route response cache configuration.
//!
//! Fixed once a route is wired; built from the `[[routes]]` settings.

use std::time::Duration;

use axum::http::Method;

use crate::config::{CacheSettings, RouteCacheSettings};

use super::{
    keys::KeyStrategy,
    policy::{CacheabilityPolicy, PathPredicate},
};

// Defaults used when a filter is composed in code rather than from settings
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(250);
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Configuration of one caching filter instance.
#[derive(Debug, Clone)]
pub struct RouteCacheConfig {
    /// Route name, used as the `cache` label on metrics and logs.
    pub name: String,
    /// Key namespace for this filter.
    pub keys: KeyStrategy,
    /// Which requests take part in caching.
    pub policy: CacheabilityPolicy,
    /// Lifetime of stored entries.
    pub ttl: Duration,
    /// Upper bound on any single store operation.
    pub operation_timeout: Duration,
    /// Larger bodies are streamed through but not stored.
    pub max_body_bytes: usize,
    /// Drop the whole namespace after a successful write through the route.
    pub invalidate_on_write: bool,
}

impl RouteCacheConfig {
    /// GET-only, match-all configuration with the default limits.
    pub fn new(name: impl Into<String>, key_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: KeyStrategy::new(key_prefix),
            policy: CacheabilityPolicy::default(),
            ttl: DEFAULT_TTL,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            invalidate_on_write: true,
        }
    }

    pub fn from_settings(
        route_name: &str,
        route: &RouteCacheSettings,
        cache: &CacheSettings,
    ) -> Self {
        Self {
            name: route_name.to_string(),
            keys: KeyStrategy::new(route.key_prefix.clone()),
            policy: CacheabilityPolicy::new(route.methods.iter().cloned(), route.path.clone()),
            ttl: route.ttl,
            operation_timeout: cache.operation_timeout,
            max_body_bytes: cache.max_body_bytes,
            invalidate_on_write: route.invalidate_on_write,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_policy(
        mut self,
        methods: impl IntoIterator<Item = Method>,
        path: PathPredicate,
    ) -> Self {
        self.policy = CacheabilityPolicy::new(methods, path);
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}
