//! Pattern invalidation.
//!
//! Best effort throughout: listing or deleting may fail part way, in which case
//! the failure is logged and whatever was removed so far is reported.

use std::{sync::Arc, time::Duration};

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use tracing::{debug, info, warn};

use super::{
    middleware::CacheState,
    store::{CacheStore, bounded},
};

/// Deletes every key matching a glob pattern.
#[derive(Clone)]
pub struct Invalidator {
    store: Arc<dyn CacheStore>,
    operation_timeout: Duration,
}

impl Invalidator {
    pub fn new(store: Arc<dyn CacheStore>, operation_timeout: Duration) -> Self {
        Self {
            store,
            operation_timeout,
        }
    }

    /// Returns the number of keys actually removed. Never fails.
    pub async fn invalidate(&self, pattern: &str) -> usize {
        let keys = match bounded("keys", self.operation_timeout, self.store.keys(pattern)).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(pattern, error = %err, "failed to list cache keys");
                return 0;
            }
        };

        let mut removed = 0;
        for key in &keys {
            match bounded("delete", self.operation_timeout, self.store.delete(key)).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(pattern, key = %key, error = %err, "failed to delete cache key");
                }
            }
        }

        debug!(pattern, matched = keys.len(), removed, "invalidated cache keys");
        removed
    }
}

/// Drop a route's cached entries after a successful write through it.
///
/// Runs for non-safe methods only and waits for the invalidation before
/// returning the response, so a client that writes and then reads does not
/// see its own stale listing.
pub async fn invalidate_on_write(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = &cache.config;
    if !config.invalidate_on_write || request.method().is_safe() {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let response = next.run(request).await;
    if !response.status().is_success() {
        return response;
    }

    let pattern = config.keys.namespace_pattern();
    let removed = Invalidator::new(cache.store.clone(), config.operation_timeout)
        .invalidate(&pattern)
        .await;
    cache.stats.record_invalidated(&config.name, removed as u64);
    info!(
        cache = %config.name,
        method = %method,
        pattern = %pattern,
        removed,
        "cache namespace invalidated after write"
    );

    response
}
