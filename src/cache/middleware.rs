//! Cache-aside response filter.
//!
//! Sits in front of a route's proxy handler. Eligible requests are answered
//! from the store when an entry exists; otherwise the request goes downstream
//! and a successful body is captured on its way back. A store that errors or
//! stalls never fails the request: the filter behaves as if the entry were
//! missing.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument, warn};

use super::{
    capture::{CaptureTarget, HIT, X_CACHE, capture, mark_miss},
    config::RouteCacheConfig,
    stats::CacheStats,
    store::{CacheStore, bounded},
};

/// Shared state of one caching filter.
#[derive(Clone)]
pub struct CacheState {
    pub config: Arc<RouteCacheConfig>,
    pub store: Arc<dyn CacheStore>,
    pub stats: Arc<CacheStats>,
}

impl CacheState {
    pub fn new(config: RouteCacheConfig, store: Arc<dyn CacheStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            stats: Arc::new(CacheStats::new()),
        }
    }
}

#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = &cache.config;

    if !config
        .policy
        .should_cache(request.method(), request.uri().path())
    {
        cache.stats.record_bypass(&config.name);
        return next.run(request).await;
    }

    let key = config.keys.compute(request.method(), request.uri());
    let lookup = bounded(
        "get",
        config.operation_timeout,
        cache.store.get(key.as_str()),
    )
    .await;

    match lookup {
        Ok(Some(body)) => {
            cache.stats.record_hit(&config.name);
            debug!(cache = %config.name, key = %key, outcome = "hit", "serving cached response");
            hit_response(body)
        }
        Ok(None) => {
            cache.stats.record_miss(&config.name);
            debug!(cache = %config.name, key = %key, outcome = "miss", "forwarding request");
            let response = next.run(request).await;
            capture(
                response,
                CaptureTarget {
                    store: cache.store.clone(),
                    key,
                    ttl: config.ttl,
                    operation_timeout: config.operation_timeout,
                    max_body_bytes: config.max_body_bytes,
                    cache_name: config.name.clone(),
                    stats: cache.stats.clone(),
                },
            )
        }
        Err(err) => {
            cache.stats.record_store_error(&config.name, err.kind());
            cache.stats.record_miss(&config.name);
            warn!(
                cache = %config.name,
                key = %key,
                error = %err,
                "cache lookup failed, forwarding request"
            );
            mark_miss(next.run(request).await)
        }
    }
}

fn hit_response(body: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, header::HeaderValue::from_static("application/json")),
            (X_CACHE, HIT),
        ],
        body,
    )
        .into_response()
}
